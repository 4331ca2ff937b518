//! # Parameter System
//!
//! Free parameters of the simulator and the bounded space the swarm searches.
//!
//! ## Core Components
//!
//! - [`Bounds`]: a finite, ordered interval
//! - [`Parameter`]: a named simulator parameter with bounds
//! - [`ParameterSpace`]: the ordered set of parameters, loaded from a
//!   `name lower upper` text file
//!
//! ## Example Usage
//!
//! ```rust
//! use swarm_calib::parameters::ParameterSpace;
//!
//! let space: ParameterSpace = "SfrEfficiency 0.01 0.2\nRadioModeEfficiency 0.0 0.5\n"
//!     .parse()
//!     .unwrap();
//! assert_eq!(space.dimension(), 2);
//! ```

pub mod bounds;
pub mod parameter;
pub mod space;

// Re-export key types
pub use bounds::{Bounds, BoundsError};
pub use parameter::Parameter;
pub use space::ParameterSpace;
