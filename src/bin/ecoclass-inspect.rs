//! Developer utility to open a dataset and print what a training run would see.

use std::path::PathBuf;

use ecoclass::config::{self, DatasetConfig};
use ecoclass::dataset::{AnyDataset, DataLoader, Dataset, Sample};
use ecoclass::logging;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Default)]
struct Options {
    config_path: Option<PathBuf>,
    data_path: Option<PathBuf>,
    class_map_path: Option<PathBuf>,
    priority_classes: Option<Vec<String>>,
    train: bool,
    tta: bool,
    image_size: Option<u32>,
    samples: usize,
    batches: usize,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let config = build_config(&options)?;
    let mut dataset = config.open().map_err(|err| err.to_string())?;
    print_summary(&config, &dataset);

    for index in 0..options.samples.min(dataset.len()) {
        let sample = dataset.get_item(index).map_err(|err| err.to_string())?;
        print_sample(index, &sample);
    }

    if options.batches > 0 {
        let mut loader = DataLoader::new(&mut dataset, config.loader.clone());
        println!(
            "Loader: {} batches per epoch (batch size {}, {} workers)",
            loader.num_batches(),
            loader.config().batch_size,
            loader.config().num_workers
        );
        for (idx, batch) in loader.epoch().take(options.batches).enumerate() {
            let batch = batch.map_err(|err| err.to_string())?;
            let labels: Vec<usize> = batch.iter().map(|sample| sample.label).collect();
            println!("  batch {idx}: {} samples, labels {labels:?}", batch.len());
        }
    }
    Ok(())
}

fn build_config(options: &Options) -> Result<DatasetConfig, String> {
    let mut config = match (&options.config_path, &options.data_path) {
        (Some(path), _) => config::load(path).map_err(|err| err.to_string())?,
        (None, Some(data)) => DatasetConfig::new(data),
        (None, None) => {
            let path = config::default_config_path().map_err(|err| err.to_string())?;
            if !path.is_file() {
                return Err(format!(
                    "No dataset given: pass --config or --data, or create {}",
                    path.display()
                ));
            }
            config::load(&path).map_err(|err| err.to_string())?
        }
    };
    if options.config_path.is_some()
        && let Some(data) = &options.data_path
    {
        config.data_path = data.clone();
    }
    if let Some(path) = &options.class_map_path {
        config.class_map_path = path.clone();
    }
    if let Some(priority) = &options.priority_classes {
        config.priority_classes = priority.clone();
    }
    if let Some(size) = options.image_size {
        config.image_size = size;
    }
    config.train |= options.train;
    config.tta |= options.tta;
    Ok(config)
}

fn print_summary(config: &DatasetConfig, dataset: &AnyDataset) {
    println!("Dataset: {} ({:?})", config.data_path.display(), dataset.kind());
    println!("Images: {}", dataset.len());
    println!("Class map: {}", dataset.class_map_path().display());
    let class_map = dataset.class_map();
    let counts = dataset.label_counts();
    let mut labels: Vec<usize> = class_map.iter().map(|(_, label)| label).collect();
    labels.extend(counts.keys().copied());
    labels.sort_unstable();
    labels.dedup();
    println!("Per-label counts:");
    for label in labels {
        let names: Vec<&str> = class_map
            .iter()
            .filter(|&(_, l)| l == label)
            .map(|(name, _)| name)
            .collect();
        let count = counts.get(&label).copied().unwrap_or(0);
        println!("  {label:>4}  {count:>7}  {}", names.join(", "));
    }
}

fn print_sample(index: usize, sample: &Sample) {
    match sample.image.rotations() {
        Some(rotations) => {
            println!("  sample {index}: label {}", sample.label);
            for (angle, tensor) in rotations {
                let (min, max) = tensor.value_range().unwrap_or_default();
                println!(
                    "    rot {angle:>3}: shape {:?}, range [{min:.3}, {max:.3}]",
                    tensor.shape()
                );
            }
        }
        None => {
            for tensor in sample.image.tensors() {
                let (min, max) = tensor.value_range().unwrap_or_default();
                println!(
                    "  sample {index}: label {}, shape {:?}, range [{min:.3}, {max:.3}]",
                    sample.label,
                    tensor.shape()
                );
            }
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut options = Options {
        samples: 4,
        ..Options::default()
    };

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--data" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--data requires a value".to_string())?;
                options.data_path = Some(PathBuf::from(value));
            }
            "--class-map" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--class-map requires a value".to_string())?;
                options.class_map_path = Some(PathBuf::from(value));
            }
            "--priority" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--priority requires a value".to_string())?;
                options.priority_classes = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect(),
                );
            }
            "--image-size" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--image-size requires a value".to_string())?;
                options.image_size = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| format!("Invalid --image-size value: {value}"))?,
                );
            }
            "--samples" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--samples requires a value".to_string())?;
                options.samples = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --samples value: {value}"))?;
            }
            "--batches" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--batches requires a value".to_string())?;
                options.batches = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --batches value: {value}"))?;
            }
            "--train" => options.train = true,
            "--tta" => options.tta = true,
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    Ok(Some(options))
}

fn help_text() -> String {
    [
        "ecoclass-inspect",
        "",
        "Opens a folder or tar dataset and prints its class map, label counts and a few decoded samples.",
        "",
        "Usage:",
        "  ecoclass-inspect [--config <file.toml>] [--data <dir|file.tar>] [options]",
        "",
        "Without --config or --data the dataset.toml in the application directory is used.",
        "",
        "Options:",
        "  --config <path>        Dataset config (TOML).",
        "  --data <path>          Image directory or .tar archive.",
        "  --class-map <path>     Class map file (default: class_map.json).",
        "  --priority <a,b,...>   Priority classes; others collapse into \"rest\" (label 0).",
        "  --train                Training mode: derive a missing class map, random transforms.",
        "  --tta                  Decode samples as the four TTA rotations.",
        "  --image-size <u32>     Output edge length (default: 224).",
        "  --samples <usize>      Samples to decode and describe (default: 4).",
        "  --batches <usize>      Batches to pull through the data loader (default: 0).",
    ]
    .join("\n")
}
