use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;
use std::str::FromStr;

use spatialcv_classifiers::config::{ModelConfig, ModelType, PipelineConfig};
use spatialcv_classifiers::folds::CoveragePolicy;
use spatialcv_classifiers::metrics::MetricKind;
use spatialcv_cli::pipeline::{load_pipeline_config, run_classify, run_crossval, run_folds, PipelineInputs};

fn input_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("grid")
                .help("Predictor grid table (row,col,<band>...; *.csv or *.tsv)")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("regions")
                .help("Labeled region cells (group,class,row,col; *.csv or *.tsv)")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to pipeline JSON configuration file")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("folds")
                .short('k')
                .long("folds")
                .help("Number of folds. Overrides cv.n_folds from the config.")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Fold assignment seed. Overrides cv.seed from the config.")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("policy")
                .long("policy")
                .help("What to do when a class has fewer regions than folds.")
                .value_parser(["degrade", "reduce-folds", "error"])
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("nodata")
                .long("nodata")
                .help("Band value that marks a cell as missing.")
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("sequential")
                .long("sequential")
                .help("Run fold cycles and tiles on the calling thread only.")
                .action(ArgAction::SetTrue),
        )
}

fn model_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("model_type")
                .long("model-type")
                .help("Evaluate a single candidate of this model type instead of the configured list.")
                .value_parser(["minimum_distance", "maximum_likelihood", "gbdt"])
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("metric")
                .long("metric")
                .help("Fold score used to compare candidates.")
                .value_parser(["kappa", "overall-accuracy", "macro-f1"])
                .value_hint(ValueHint::Other),
        )
}

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("SPATIALCV_LOG", "error,spatialcv=info"))
        .init();

    let matches = Command::new("spatialcv")
        .version(clap::crate_version!())
        .about("Spatially grouped cross-validation and tiled raster classification")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            input_args(Command::new("folds").about("Assign labeled regions to class-stratified folds")).arg(
                Arg::new("output_file")
                    .short('o')
                    .long("output")
                    .help("Where to write the group,fold table")
                    .default_value("folds.csv")
                    .value_parser(clap::value_parser!(PathBuf))
                    .value_hint(ValueHint::FilePath),
            ),
        )
        .subcommand(
            model_args(input_args(
                Command::new("crossval").about("Cross-validate the model candidates and write a report"),
            ))
            .arg(
                Arg::new("report_dir")
                    .short('r')
                    .long("report-dir")
                    .help("Directory for the cross-validation report")
                    .default_value("spatialcv_report")
                    .value_parser(clap::value_parser!(PathBuf))
                    .value_hint(ValueHint::DirPath),
            ),
        )
        .subcommand(
            model_args(input_args(
                Command::new("classify")
                    .about("Select a model by cross-validation, refit it on all regions and classify the grid"),
            ))
            .arg(
                Arg::new("output_file")
                    .short('o')
                    .long("output")
                    .help("Where to write the row,col,class table")
                    .default_value("classified.csv")
                    .value_parser(clap::value_parser!(PathBuf))
                    .value_hint(ValueHint::FilePath),
            )
            .arg(
                Arg::new("report_dir")
                    .short('r')
                    .long("report-dir")
                    .help("Also write the cross-validation report to this directory")
                    .value_parser(clap::value_parser!(PathBuf))
                    .value_hint(ValueHint::DirPath),
            )
            .arg(
                Arg::new("tile_size")
                    .long("tile-size")
                    .help("Tile edge length in cells. Overrides predict.tile_size from the config.")
                    .value_parser(clap::value_parser!(usize)),
            ),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("folds", sub_m)) => handle_folds(sub_m),
        Some(("crossval", sub_m)) => handle_crossval(sub_m),
        Some(("classify", sub_m)) => handle_classify(sub_m),
        _ => unreachable!("Subcommand is required by CLI configuration"),
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn path_arg(matches: &ArgMatches, id: &str) -> Result<PathBuf> {
    matches
        .get_one::<PathBuf>(id)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Missing argument '{}'", id))
}

fn inputs(matches: &ArgMatches) -> PipelineInputs {
    PipelineInputs {
        grid: matches.get_one::<PathBuf>("grid").cloned().unwrap_or_default(),
        regions: matches.get_one::<PathBuf>("regions").cloned().unwrap_or_default(),
        nodata: matches.get_one::<f32>("nodata").copied(),
    }
}

/// Config file (or defaults) with the command line overrides applied.
fn config_from_arguments(matches: &ArgMatches) -> Result<PipelineConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            eprintln!("[spatialcv] Using config: {:?}", path);
            load_pipeline_config(path)?
        }
        None => {
            let config = PipelineConfig::default();
            eprintln!("[spatialcv] No config provided; using defaults.");
            eprintln!(
                "[spatialcv] Default config:\n{}",
                serde_json::to_string_pretty(&config).unwrap_or_default()
            );
            config
        }
    };

    if let Some(&k) = matches.get_one::<usize>("folds") {
        config.cv.n_folds = k;
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        config.cv.seed = seed;
    }
    if let Some(policy) = matches.get_one::<String>("policy") {
        config.cv.coverage_policy = match policy.as_str() {
            "reduce-folds" => CoveragePolicy::ReduceFolds,
            "error" => CoveragePolicy::Error,
            _ => CoveragePolicy::Degrade,
        };
    }
    if matches.get_flag("sequential") {
        config.cv.parallel = false;
        config.predict.parallel = false;
    }
    if let Ok(Some(model_type)) = matches.try_get_one::<String>("model_type") {
        let model_type = ModelType::from_str(model_type).map_err(anyhow::Error::msg)?;
        config.candidates = vec![ModelConfig::new(config.cv.seed, model_type)];
    }
    if let Ok(Some(metric)) = matches.try_get_one::<String>("metric") {
        config.cv.metric = match metric.as_str() {
            "overall-accuracy" => MetricKind::OverallAccuracy,
            "macro-f1" => MetricKind::MacroF1,
            _ => MetricKind::Kappa,
        };
    }
    if let Ok(Some(&tile_size)) = matches.try_get_one::<usize>("tile_size") {
        config.predict.tile_size = tile_size;
    }
    Ok(config)
}

fn handle_folds(matches: &ArgMatches) -> Result<()> {
    let config = config_from_arguments(matches)?;
    let output = path_arg(matches, "output_file")?;
    let assignment = run_folds(&inputs(matches), &config, &output)?;
    for warning in assignment.warnings() {
        eprintln!("[spatialcv] Warning: {:?}", warning);
    }
    eprintln!(
        "[spatialcv] Assigned regions to {} folds; written to {:?}",
        assignment.k(),
        output
    );
    Ok(())
}

fn handle_crossval(matches: &ArgMatches) -> Result<()> {
    let config = config_from_arguments(matches)?;
    let report_dir = path_arg(matches, "report_dir")?;
    let sweep = run_crossval(&inputs(matches), &config, &report_dir)?;
    let best = sweep.best_run();
    eprintln!(
        "[spatialcv] Best candidate: {} (mean {} {:.4}); report in {:?}",
        best.config.model_type.name(),
        config.cv.metric.name(),
        best.mean_score,
        report_dir
    );
    Ok(())
}

fn handle_classify(matches: &ArgMatches) -> Result<()> {
    let config = config_from_arguments(matches)?;
    let output = path_arg(matches, "output_file")?;
    let report_dir = matches.get_one::<PathBuf>("report_dir");
    let summary = run_classify(&inputs(matches), &config, &output, report_dir.map(PathBuf::as_path))?;
    eprintln!(
        "[spatialcv] Classified {} cells ({} no-data); written to {:?}",
        summary.predicted_cells, summary.nodata_cells, output
    );
    Ok(())
}
