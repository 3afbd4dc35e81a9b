pub mod convert;
pub mod finalizer;
pub mod fs;

pub use convert::{Converter, FfmpegConverter};
pub use finalizer::{recording_file_name, ConversionOutcome, DirectoryOutcome, PersistenceFinalizer, SavedRecording};
pub use fs::{is_permission_error, Filesystem, LocalFilesystem};
