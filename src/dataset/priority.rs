//! Priority-class collapsing.
//!
//! Priority classes keep their own labels (`1..=N` in the order given); every
//! other class lands in the shared "rest" bucket with label 0. Only the
//! priority names and `rest` appear in the resulting map, so non-priority
//! classes reach label 0 through the dataset's unknown-class fallback.

use std::path::{Path, PathBuf};

use super::class_map::ClassMap;

/// Suffix inserted before the extension of the priority class map file.
pub const PRIORITY_SUFFIX: &str = "_priority";
/// Name of the catch-all class.
pub const REST_CLASS: &str = "rest";
/// Label shared by every non-priority class.
pub const REST_LABEL: usize = 0;

/// Sibling path used for the priority variant of a class map.
///
/// `out/class_map.json` becomes `out/class_map_priority.json`.
pub fn priority_class_map_path(base: &Path) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match base.extension() {
        Some(ext) => format!("{stem}{PRIORITY_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{PRIORITY_SUFFIX}"),
    };
    base.with_file_name(file_name)
}

/// Build the collapsed class map for the given priority classes.
pub fn define_priority_classes(priority_classes: &[String]) -> ClassMap {
    let mut map: ClassMap = priority_classes
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.clone(), idx + 1))
        .collect();
    map.insert(REST_CLASS, REST_LABEL);
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_path_inserts_suffix_before_extension() {
        assert_eq!(
            priority_class_map_path(Path::new("runs/exp1/class_map.json")),
            PathBuf::from("runs/exp1/class_map_priority.json")
        );
        assert_eq!(
            priority_class_map_path(Path::new("labels")),
            PathBuf::from("labels_priority")
        );
    }

    #[test]
    fn priority_classes_are_numbered_from_one_with_rest_at_zero() {
        let map = define_priority_classes(&["daphnia".into(), "copepod".into()]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.label_of("daphnia"), Some(1));
        assert_eq!(map.label_of("copepod"), Some(2));
        assert_eq!(map.label_of(REST_CLASS), Some(REST_LABEL));
        assert_eq!(map.label_of("rotifer"), None);
    }

    #[test]
    fn rest_cannot_be_promoted_to_priority() {
        let map = define_priority_classes(&["rest".into(), "daphnia".into()]);
        assert_eq!(map.label_of("rest"), Some(0));
        assert_eq!(map.label_of("daphnia"), Some(2));
    }
}
