// Calibrations built from a configuration file, with a synthetic handler
mod end_to_end;
