pub mod augment;
pub mod batch;
pub mod image_folder;
pub mod partition;
pub mod source;

pub use augment::Augmentation;
pub use batch::Batch;
pub use image_folder::{FolderOptions, ImageFolderSource};
pub use source::{BatchSource, InMemorySource};
