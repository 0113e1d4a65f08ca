use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sheetimg_core::{CellAddressing, CellReference, EmbedConfig, Embedder};
use std::path::PathBuf;

mod formatter;
mod logging;

#[derive(Parser)]
#[command(name = "sheetimg")]
#[command(about = "Embed images into xlsx cells (cellimages.xml / DISPIMG)", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the xlsx file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Worksheet to patch
    #[arg(short, long, value_name = "NAME")]
    sheet: String,

    /// Header of the column holding the image paths
    #[arg(long, value_name = "HEADER", required_unless_present = "images", conflicts_with = "images")]
    column: Option<String>,

    /// Image paths, one per data row starting below the header
    #[arg(long, num_args = 1.., value_name = "PATH", requires = "target_column")]
    images: Vec<String>,

    /// Column that receives `--images` (zero-based index or letters, e.g. 2 or C)
    #[arg(long, value_name = "COLUMN", value_parser = parse_column)]
    target_column: Option<u32>,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// How target rows and cells are found in the worksheet
    #[arg(long, value_enum)]
    addressing: Option<Addressing>,

    /// Leave the unpacked working directory on disk
    #[arg(long)]
    keep_work_dir: bool,

    /// Run every edit but do not write the output file
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Addressing {
    /// N-th row and cell elements (dense sheets)
    Positional,
    /// Row number and cell address attributes (sparse sheets)
    ByReference,
}

impl From<Addressing> for CellAddressing {
    fn from(value: Addressing) -> Self {
        match value {
            Addressing::Positional => CellAddressing::Positional,
            Addressing::ByReference => CellAddressing::ByReference,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn parse_column(value: &str) -> Result<u32, String> {
    if let Ok(index) = value.parse::<u32>() {
        return Ok(index);
    }
    CellReference::letter_to_col(value)
        .ok_or_else(|| format!("'{}' is neither a column index nor column letters", value))
}

fn load_config(cli: &Cli) -> Result<EmbedConfig> {
    let mut config = if let Some(config_path) = &cli.config {
        EmbedConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try to load default config from current directory if it exists
        let default_config_path = PathBuf::from("sheetimg.toml");
        if default_config_path.exists() {
            EmbedConfig::from_file(&default_config_path).with_context(|| {
                format!(
                    "Failed to load config from {}",
                    default_config_path.display()
                )
            })?
        } else {
            EmbedConfig::default()
        }
    };

    // Flags override the file
    if let Some(addressing) = cli.addressing {
        config.addressing = addressing.into();
    }
    if cli.keep_work_dir {
        config.keep_work_dir = true;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config = load_config(&cli)?;
    tracing::debug!("Configuration: {:?}", config);
    let embedder = Embedder::with_config(config).dry_run(cli.dry_run);

    let report = match (&cli.column, cli.target_column) {
        (Some(header), _) => embedder.embed_column(&cli.file, &cli.output, &cli.sheet, header),
        (None, Some(column)) => {
            embedder.embed_paths(&cli.file, &cli.output, &cli.sheet, column, &cli.images)
        }
        (None, None) => anyhow::bail!("Either --column or --images with --target-column is required."),
    }
    .with_context(|| format!("Failed to embed images into {}", cli.file.display()))?;

    match cli.format {
        OutputFormat::Human => formatter::print_human(&cli.file, &report),
        OutputFormat::Json => formatter::print_json(&cli.file, &report)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_column() {
        assert_eq!(parse_column("2"), Ok(2));
        assert_eq!(parse_column("C"), Ok(2));
        assert_eq!(parse_column("aa"), Ok(26));
        assert!(parse_column("C3").is_err());
    }

    #[test]
    fn test_column_and_images_conflict() {
        let result = Cli::try_parse_from([
            "sheetimg", "in.xlsx", "--sheet", "Sheet1", "-o", "out.xlsx", "--column", "pic",
            "--images", "a.png", "--target-column", "C",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_images_need_target_column() {
        let result = Cli::try_parse_from([
            "sheetimg", "in.xlsx", "--sheet", "Sheet1", "-o", "out.xlsx", "--images", "a.png",
        ]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "sheetimg", "in.xlsx", "--sheet", "Sheet1", "-o", "out.xlsx", "--images", "a.png",
            "b.png", "--target-column", "B", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.images, vec!["a.png", "b.png"]);
        assert_eq!(cli.target_column, Some(1));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "sheetimg", "in.xlsx", "--sheet", "S", "-o", "out.xlsx", "--column", "pic",
            "--addressing", "by-reference", "--keep-work-dir",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.addressing, CellAddressing::ByReference);
        assert!(config.keep_work_dir);
    }
}
