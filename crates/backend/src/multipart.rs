//! Multipart upload planning
//!
//! Files at or above the configured threshold are uploaded in parts read
//! straight from disk. Part sizes respect the S3 limits.

use iris_core::TransferSettings;

/// Minimum part size: 5 MiB (S3 requirement)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size: 5 GiB
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts: 10,000 (S3 limit)
pub const MAX_PARTS: usize = 10_000;

/// Multipart upload configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartConfig {
    /// Files at or above this size use multipart upload
    pub threshold: u64,

    /// Preferred part size in bytes
    pub part_size: u64,
}

impl MultipartConfig {
    pub fn from_settings(settings: &TransferSettings) -> Self {
        Self {
            threshold: settings.multipart_threshold,
            part_size: settings.multipart_part_size.clamp(MIN_PART_SIZE, MAX_PART_SIZE),
        }
    }

    /// Whether a file of this size is uploaded in parts
    pub fn use_multipart(&self, file_size: u64) -> bool {
        file_size > 0 && file_size >= self.threshold
    }

    /// Calculate appropriate part size for a file
    pub fn calculate_part_size(&self, file_size: u64) -> u64 {
        let parts = file_size.div_ceil(self.part_size);

        if parts <= MAX_PARTS as u64 {
            self.part_size
        } else {
            // larger parts to stay within the part limit
            let required_size = file_size.div_ceil(MAX_PARTS as u64);
            required_size.clamp(MIN_PART_SIZE, MAX_PART_SIZE)
        }
    }
}

/// Calculate number of parts for a file
pub fn calculate_parts(file_size: u64, part_size: u64) -> usize {
    file_size.div_ceil(part_size) as usize
}

/// Byte range `[start, end)` of a 1-based part
pub fn part_byte_range(part_number: i32, part_size: u64, total_size: u64) -> (u64, u64) {
    let start = (part_number as u64 - 1) * part_size;
    let end = (start + part_size).min(total_size);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_from_default_settings() {
        let config = MultipartConfig::from_settings(&TransferSettings::default());
        assert_eq!(config.threshold, 10 * MIB);
        assert_eq!(config.part_size, 40 * MIB);
    }

    #[test]
    fn test_part_size_clamping() {
        let settings = TransferSettings {
            multipart_part_size: 1024,
            ..Default::default()
        };
        assert_eq!(MultipartConfig::from_settings(&settings).part_size, MIN_PART_SIZE);

        let settings = TransferSettings {
            multipart_part_size: 10 * 1024 * MIB,
            ..Default::default()
        };
        assert_eq!(MultipartConfig::from_settings(&settings).part_size, MAX_PART_SIZE);
    }

    #[test]
    fn test_threshold() {
        let config = MultipartConfig::from_settings(&TransferSettings::default());
        assert!(!config.use_multipart(0));
        assert!(!config.use_multipart(10 * MIB - 1));
        assert!(config.use_multipart(10 * MIB));
    }

    #[test]
    fn test_calculate_part_size_large_file() {
        let config = MultipartConfig::from_settings(&TransferSettings::default());
        let huge_file = 40 * MIB * 20_000;
        let size = config.calculate_part_size(huge_file);
        assert!(calculate_parts(huge_file, size) <= MAX_PARTS);
    }

    #[test]
    fn test_calculate_parts() {
        assert_eq!(calculate_parts(100, 10), 10);
        assert_eq!(calculate_parts(101, 10), 11);
        assert_eq!(calculate_parts(99, 10), 10);
    }

    #[test]
    fn test_part_byte_range() {
        assert_eq!(part_byte_range(1, 100, 250), (0, 100));
        assert_eq!(part_byte_range(2, 100, 250), (100, 200));
        assert_eq!(part_byte_range(3, 100, 250), (200, 250));
    }
}
