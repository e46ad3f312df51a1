mod support;

use ecoclass::config::{self, DatasetConfig};
use ecoclass::dataset::{Dataset, SourceKind};
use support::ecoclass_env::EcoclassEnvGuard;
use support::images::write_test_image;
use tempfile::tempdir;

#[test]
fn default_config_lives_in_the_application_directory() {
    let home = tempdir().unwrap();
    let _guard = EcoclassEnvGuard::set_home(home.path().to_path_buf());

    let path = config::default_config_path().unwrap();
    assert_eq!(path, home.path().join(".ecoclass").join("dataset.toml"));
}

#[test]
fn config_file_opens_the_dataset_it_describes() {
    let dir = tempdir().unwrap();
    write_test_image(&dir.path().join("images/algae/a.png"), 8, 8);
    write_test_image(&dir.path().join("images/copepod/b.png"), 8, 8);
    let path = dir.path().join("dataset.toml");
    std::fs::write(
        &path,
        "data_path = \"images\"\nclass_map_path = \"run/class_map.json\"\ntrain = true\nimage_size = 32\n",
    )
    .unwrap();

    let config: DatasetConfig = config::load(&path).unwrap();
    let dataset = config.open().unwrap();

    assert_eq!(dataset.kind(), SourceKind::Folder);
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.class_map().len(), 2);
    assert!(dir.path().join("run/class_map.json").is_file());
    let sample = dataset.get_item(0).unwrap();
    assert_eq!(sample.image.as_tensor().unwrap().shape(), [3, 32, 32]);
}
