//! 图片侧的本地处理：路径白名单、EXIF/GPS、图片读取与编码、元数据回写、目录扫描

pub mod error;
pub mod gps;
pub mod image_file;
pub mod metadata;
pub mod path_guard;
pub mod record;
pub mod scan;

pub use error::{IndexingError, IndexingResult};
pub use gps::GpsCoordinates;
pub use image_file::{EncodedImage, ImageInfo};
pub use path_guard::PathValidator;
pub use record::{ImagePayload, ImageRecord};
pub use scan::ImageScanner;
