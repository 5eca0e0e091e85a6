//! Cache inspection commands (info, export)

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::cache_file::{self, CacheHeader, CachedBucket};

use super::{EXIT_ERROR, EXIT_SUCCESS};

fn read_cache(path: &Path) -> Result<(CacheHeader, Vec<CachedBucket>), String> {
    let bytes = fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    cache_file::decode(&bytes, None).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Execute the info command
pub fn run_info(path: &Path) -> ExitCode {
    let (header, buckets) = match read_cache(path) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    println!("Cache: {}", path.display());
    println!("  Version:  {}", header.version);
    println!("  Checksum: {:#010x}", header.checksum);
    println!("  Buckets:  {}", buckets.len());
    for bucket in &buckets {
        println!(
            "    {:>9}  {:>5} sprites  {:>3} pages",
            bucket.sprite_size.to_string(),
            bucket.sprite_count,
            bucket.pages.len()
        );
    }

    ExitCode::from(EXIT_SUCCESS)
}

/// File name a page is exported under.
pub(crate) fn page_file_name(bucket: &CachedBucket, page: usize) -> PathBuf {
    PathBuf::from(format!("{}x{}_{}.png", bucket.sprite_size.width, bucket.sprite_size.height, page))
}

/// Execute the export command
pub fn run_export(path: &Path, out_dir: &Path) -> ExitCode {
    let (_, buckets) = match read_cache(path) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if let Err(e) = fs::create_dir_all(out_dir) {
        eprintln!("Error: {}: {}", out_dir.display(), e);
        return ExitCode::from(EXIT_ERROR);
    }

    let mut written = 0;
    for bucket in &buckets {
        for (index, page) in bucket.pages.iter().enumerate() {
            let target = out_dir.join(page_file_name(bucket, index));
            if let Err(e) = page.save(&target) {
                eprintln!("Error: {}: {}", target.display(), e);
                return ExitCode::from(EXIT_ERROR);
            }
            log::debug!("wrote {}", target.display());
            written += 1;
        }
    }

    println!("Exported {} pages to {}", written, out_dir.display());
    ExitCode::from(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Size;

    #[test]
    fn test_page_file_name() {
        let bucket = CachedBucket { sprite_size: Size::new(16, 32), sprite_count: 0, pages: vec![] };
        assert_eq!(page_file_name(&bucket, 3), PathBuf::from("16x32_3.png"));
    }
}
