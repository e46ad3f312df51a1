//! Developer utility to derive (or load) and print the class map for a dataset.

use std::path::PathBuf;

use ecoclass::dataset::{DEFAULT_CLASS_MAP_FILE, class_map, source};
use ecoclass::logging;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

struct Options {
    data_path: PathBuf,
    class_map_path: PathBuf,
    priority_classes: Vec<String>,
    eval: bool,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let map = class_map::resolve(
        &options.class_map_path,
        &options.priority_classes,
        !options.eval,
        || source::discover_class_names(&options.data_path),
    )
    .map_err(|err| err.to_string())?;

    let path = class_map::effective_class_map_path(&options.class_map_path, &options.priority_classes);
    println!("Class map: {}", path.display());
    let mut entries: Vec<(&str, usize)> = map.iter().collect();
    entries.sort_by_key(|&(name, label)| (label, name));
    for (name, label) in entries {
        println!("  {label:>4}  {name}");
    }
    println!("{} entries", map.len());
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut data_path = None;
    let mut class_map_path = PathBuf::from(DEFAULT_CLASS_MAP_FILE);
    let mut priority_classes = Vec::new();
    let mut eval = false;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--data" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--data requires a value".to_string())?;
                data_path = Some(PathBuf::from(value));
            }
            "--class-map" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--class-map requires a value".to_string())?;
                class_map_path = PathBuf::from(value);
            }
            "--priority" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--priority requires a value".to_string())?;
                priority_classes = parse_class_list(value);
            }
            "--eval" => eval = true,
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    let data_path = data_path.ok_or_else(|| "--data is required".to_string())?;
    Ok(Some(Options {
        data_path,
        class_map_path,
        priority_classes,
        eval,
    }))
}

fn parse_class_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn help_text() -> String {
    [
        "ecoclass-class-map",
        "",
        "Loads the class map for a dataset, deriving and saving it when missing.",
        "",
        "Usage:",
        "  ecoclass-class-map --data <dir|file.tar> [options]",
        "",
        "Options:",
        "  --data <path>          Image directory or .tar archive (required).",
        "  --class-map <path>     Class map file (default: class_map.json).",
        "  --priority <a,b,...>   Priority classes; others collapse into \"rest\" (label 0).",
        "  --eval                 Only load an existing class map, never derive one.",
    ]
    .join("\n")
}
