pub mod core;
pub mod courses;
pub mod departments;
pub mod exams;
pub mod fees;
pub mod import;
pub mod programs;
pub mod session;
pub mod staff;
pub mod students;
