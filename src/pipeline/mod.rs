pub mod bounce;
pub mod pattern;
pub mod persistence;
pub mod piano_roll;
pub mod project;
pub mod track;
pub mod transport;
