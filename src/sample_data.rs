//! Sample data media marshalling.
//!
//! The sample data package ships its media under the vendor tree; the
//! storefront serves it from `pub/media`. Mirroring is self-first and
//! overwrites whatever is already there.

use crate::build::BuildPaths;
use crate::build_log::BuildLog;
use crate::error::Result;
use crate::fs_ops;

/// Mirror `vendor/magento/sample-data-media` into `pub/media`.
///
/// Returns the number of files copied. A missing sample data package is
/// logged and is not an error.
pub fn marshal_sample_data(paths: &BuildPaths, log: &BuildLog) -> Result<usize> {
    if !paths.sample_data_media.is_dir() {
        log.log(format!(
            "Sample data media not found in {}, nothing to copy.",
            paths.sample_data_media.display()
        ));
        return Ok(0);
    }

    log.log("Copying sample data media into pub/media.");
    let copied = fs_ops::copy_dir_contents(&paths.sample_data_media, &paths.pub_media)?;
    log.log(format!("Copied {copied} sample data media files."));
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_package_is_logged() {
        let root = TempDir::new().unwrap();
        let (log, capture) = BuildLog::capture();

        let copied = marshal_sample_data(&BuildPaths::new(root.path()), &log).unwrap();

        assert_eq!(copied, 0);
        assert!(capture.contains("Sample data media not found"));
        assert!(!root.path().join("pub/media").exists());
    }

    #[test]
    fn test_mirrors_and_overwrites() {
        let root = TempDir::new().unwrap();
        let paths = BuildPaths::new(root.path());
        let source = paths.sample_data_media.join("catalog/product/m/b");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("mb01-blue-0.jpg"), "new").unwrap();
        fs::write(paths.sample_data_media.join(".htaccess"), "Options -Indexes").unwrap();

        let target = paths.pub_media.join("catalog/product/m/b");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("mb01-blue-0.jpg"), "old").unwrap();
        fs::write(paths.pub_media.join("keep.txt"), "untouched").unwrap();

        let (log, _capture) = BuildLog::capture();
        let copied = marshal_sample_data(&paths, &log).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read_to_string(target.join("mb01-blue-0.jpg")).unwrap(), "new");
        assert!(paths.pub_media.join(".htaccess").exists());
        assert_eq!(fs::read_to_string(paths.pub_media.join("keep.txt")).unwrap(), "untouched");
    }
}
