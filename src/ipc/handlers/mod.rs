pub mod core;
pub mod entries;
pub mod gpa;
pub mod levels;
pub mod scales;
pub mod setup;
pub mod subjects;
pub mod systems;
