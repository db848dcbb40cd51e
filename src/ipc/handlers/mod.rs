pub mod attendance;
pub mod backup_exchange;
pub mod cadets;
pub mod conduct;
pub mod core;
pub mod exams;
pub mod grades;
pub mod imports;
pub mod semesters;
