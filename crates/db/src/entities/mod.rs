//! Database entities.

pub mod upload_record;
pub mod user_progression;

pub use upload_record::Entity as UploadRecord;
pub use user_progression::Entity as UserProgression;
