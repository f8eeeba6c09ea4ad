use crate::plugin::{FileLocation, FileSpec};
use crate::resolver::{normalize_target, ResolvedSet};

/// The requested files that were found, in the caller's declaration order.
/// Files never resolved are left out.
pub fn found_locations(files: &[FileSpec], resolved: &ResolvedSet) -> Vec<FileLocation> {
    files
        .iter()
        .filter(|f| resolved.contains(&normalize_target(&f.from)))
        .cloned()
        .collect()
}

/// The complement of [`found_locations`].
pub fn missing_files<'a>(files: &'a [FileSpec], found: &[FileLocation]) -> Vec<&'a FileSpec> {
    files.iter().filter(|f| !found.contains(f)).collect()
}
