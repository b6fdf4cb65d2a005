//! Repositories over the progression tables.

mod upload_record;
mod user_progression;

pub use upload_record::UploadRecordRepository;
pub use user_progression::UserProgressionRepository;
