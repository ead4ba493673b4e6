use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gabmap_diatech::zip_handler::{package_diatech, package_gabmap};
use gabmap_diatech::{diatech_to_gabmap, gabmap_to_diatech, OutputNames, Stats, ZipHandler};
use rayon::ThreadPoolBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Gabmap (TXT + KML) を Diatech (CSV + boundaries) に変換
    ToDiatech {
        /// 言語データのTXTファイル
        #[arg(value_name = "TXT")]
        txt: PathBuf,

        /// 地点座標のKMLファイル
        #[arg(value_name = "KML")]
        kml: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Diatech (CSVまたはZIP) を Gabmap (TXT + KML) に変換
    ToGabmap {
        /// Diatech のCSVファイル、またはCSVを含むZIPファイル
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// 境界のCSVファイル（ZIP入力の場合はZIP内のものを使用）
        #[arg(long, value_name = "CSV")]
        boundaries: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// ディレクトリ内のデータセットを一括変換
    Batch {
        /// 入力ディレクトリ（TXT + KML の組、Diatech のZIP）
        #[arg(value_name = "DIR")]
        input: PathBuf,

        /// 並列処理スレッド数（デフォルト: CPUコア数）
        #[arg(short, long)]
        threads: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct OutputArgs {
    /// 出力ディレクトリ
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// 結果をZIPにまとめて出力
    #[arg(long)]
    zip: bool,

    /// 統計情報をJSONで標準出力に表示
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // CLI引数の解析
    let args = Args::parse();

    // 処理開始時間を記録
    let start_time = std::time::Instant::now();

    match &args.command {
        Command::ToDiatech { txt, kml, output } => {
            fs::create_dir_all(&output.output)?;
            let converted = convert_gabmap_pair(txt, kml, output.zip)?;
            converted.write(&output.output)?;
            report(&converted.stats, output)?;
        }
        Command::ToGabmap {
            input,
            boundaries,
            output,
        } => {
            fs::create_dir_all(&output.output)?;
            let converted = convert_diatech(input, boundaries.as_deref(), output.zip)?;
            converted.write(&output.output)?;
            report(&converted.stats, output)?;
        }
        Command::Batch {
            input,
            threads,
            output,
        } => {
            // スレッドプールの設定
            if let Some(threads) = threads {
                ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build_global()
                    .context("Failed to build thread pool")?;
            }
            fs::create_dir_all(&output.output)?;
            process_directory(input, output)?;
        }
    }

    // 処理時間を表示
    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}

fn report(stats: &Stats, output: &OutputArgs) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(stats)?);
    }
    if let Some(matching) = &stats.matching {
        if matching.unmatched_count > 0 {
            warn!(
                "{} localities have no coordinates in the KML",
                matching.unmatched_count
            );
            for name in &matching.sample_unmatched {
                warn!("  {}", name);
            }
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Files produced by one conversion, relative to the output directory.
struct Converted {
    files: Vec<(PathBuf, Vec<u8>)>,
    stats: Stats,
}

impl Converted {
    /// Moves every file under `dir`, keeping the relative layout.
    fn nest_under(mut self, dir: &Path) -> Self {
        for (path, _) in &mut self.files {
            *path = dir.join(&*path);
        }
        self
    }

    fn write(&self, dir: &Path) -> Result<()> {
        for (relative, bytes) in &self.files {
            let path = dir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Written: {:?}", path);
        }
        Ok(())
    }
}

fn convert_gabmap_pair(txt: &Path, kml: &Path, zip: bool) -> Result<Converted> {
    info!("Processing Gabmap pair: {:?} + {:?}", txt, kml);

    let txt_bytes = fs::read(txt).with_context(|| format!("Failed to read {:?}", txt))?;
    let kml_bytes = fs::read(kml).with_context(|| format!("Failed to read {:?}", kml))?;

    let result = gabmap_to_diatech(&txt_bytes, &kml_bytes)
        .with_context(|| format!("Failed to convert {:?}", txt))?;
    let names = OutputNames::for_diatech(&file_name(txt), &file_name(kml));

    let mut files = Vec::new();
    if zip {
        // ZIPにまとめて出力
        let archive = package_diatech(&result, &names)?;
        files.push((PathBuf::from(&names.archive), archive));
    } else {
        files.push((PathBuf::from(&names.primary), result.csv));
        match result.boundaries {
            Some(boundaries) => files.push((PathBuf::from(&names.secondary), boundaries)),
            None => info!("No boundary polygon in {:?}", kml),
        }
    }

    Ok(Converted {
        files,
        stats: result.stats,
    })
}

fn convert_diatech(input: &Path, boundaries: Option<&Path>, zip: bool) -> Result<Converted> {
    let ext = input.extension().and_then(|s| s.to_str()).unwrap_or("");

    let (csv_name, csv, boundary_bytes) = match ext {
        "zip" => {
            // ZIPファイルの処理
            info!("Processing Diatech ZIP: {:?}", input);
            let bytes = fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
            let bundle = ZipHandler::new(&bytes).extract_diatech()?;
            if boundaries.is_some() {
                warn!("Ignoring --boundaries for ZIP input");
            }
            (bundle.csv_name, bundle.csv, bundle.boundaries)
        }
        "csv" => {
            // CSVファイルの処理
            info!("Processing Diatech CSV: {:?}", input);
            let csv = fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
            let boundary_bytes = boundaries
                .map(|path| fs::read(path).with_context(|| format!("Failed to read {:?}", path)))
                .transpose()?;
            (file_name(input), csv, boundary_bytes)
        }
        _ => {
            error!("Unsupported file type: {:?}", input);
            anyhow::bail!("Input file must be .csv or .zip");
        }
    };

    let result = diatech_to_gabmap(&csv, boundary_bytes.as_deref())
        .with_context(|| format!("Failed to convert {:?}", input))?;
    let names = OutputNames::for_gabmap(Some(&csv_name));

    let files = if zip {
        let archive = package_gabmap(&result, &names)?;
        vec![(PathBuf::from(&names.archive), archive)]
    } else {
        vec![
            (PathBuf::from(&names.primary), result.txt),
            (PathBuf::from(&names.secondary), result.kml),
        ]
    };

    Ok(Converted {
        files,
        stats: result.stats,
    })
}

#[derive(Debug, Clone)]
enum Job {
    GabmapPair { txt: PathBuf, kml: PathBuf },
    DiatechZip(PathBuf),
}

impl Job {
    fn source(&self) -> &Path {
        match self {
            Job::GabmapPair { txt, .. } => txt,
            Job::DiatechZip(path) => path,
        }
    }

    /// Converts the dataset; outputs land in the source's directory relative to `root`.
    fn run(&self, root: &Path, zip: bool) -> Result<Converted> {
        let converted = match self {
            Job::GabmapPair { txt, kml } => convert_gabmap_pair(txt, kml, zip)?,
            Job::DiatechZip(path) => convert_diatech(path, None, zip)?,
        };
        let relative = self
            .source()
            .parent()
            .and_then(|parent| parent.strip_prefix(root).ok())
            .unwrap_or_else(|| Path::new(""));
        Ok(converted.nest_under(relative))
    }
}

/// Returns the first output path that is already in `claimed`, or claims them all.
fn claim_outputs<'a>(claimed: &mut HashSet<&'a Path>, converted: &'a Converted) -> Option<&'a Path> {
    let clash = converted
        .files
        .iter()
        .map(|(path, _)| path.as_path())
        .find(|path| claimed.contains(path));
    if clash.is_none() {
        claimed.extend(converted.files.iter().map(|(path, _)| path.as_path()));
    }
    clash
}

fn process_directory(dir: &Path, output: &OutputArgs) -> Result<()> {
    use rayon::prelude::*;

    // データセットを再帰的に収集
    let jobs = collect_jobs(dir)?;
    info!("Found {} datasets", jobs.len());

    // 並列処理でデータセットを変換（書き込みは後で行う）
    let results: Vec<Result<Converted>> = jobs
        .par_iter()
        .map(|job| job.run(dir, output.zip))
        .collect();

    // 出力パスの重複をチェックしてから書き込み
    let mut claimed = HashSet::new();
    let mut errors = Vec::new();
    let mut summaries = Vec::new();
    for (job, result) in jobs.iter().zip(&results) {
        let converted = match result {
            Ok(converted) => converted,
            Err(e) => {
                errors.push(format!("{}: {:#}", job.source().display(), e));
                continue;
            }
        };
        if let Some(clash) = claim_outputs(&mut claimed, converted) {
            errors.push(format!(
                "{}: output {:?} is already produced by another dataset",
                job.source().display(),
                clash
            ));
            continue;
        }
        match converted.write(&output.output) {
            Ok(()) => summaries.push(serde_json::json!({
                "input": job.source().display().to_string(),
                "stats": converted.stats,
            })),
            Err(e) => errors.push(format!("{}: {:#}", job.source().display(), e)),
        }
    }

    if output.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    }

    if !errors.is_empty() {
        error!("Failed to process {} datasets:", errors.len());
        for err in &errors {
            error!("  {}", err);
        }
        anyhow::bail!("{} datasets failed to process", errors.len());
    }

    Ok(())
}

/// `x.txt` with a sibling `x.kml` is a Gabmap pair; every `.zip` is a Diatech bundle.
fn collect_jobs(dir: &Path) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();

    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {:?}", dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            // サブディレクトリを再帰的に探索
            jobs.extend(collect_jobs(&path)?);
            continue;
        }
        match path.extension().and_then(|s| s.to_str()) {
            Some("txt") => {
                let kml = path.with_extension("kml");
                if kml.is_file() {
                    jobs.push(Job::GabmapPair { txt: path, kml });
                } else {
                    warn!("Skipping {:?}: no matching KML", path);
                }
            }
            Some("zip") => jobs.push(Job::DiatechZip(path)),
            _ => {}
        }
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TXT: &str = "\tCASA\nTunja\tcasa\n";
    const KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
<Placemark><name>Tunja</name><Point><coordinates>-73.36,5.53,0</coordinates></Point></Placemark>
</Document></kml>"#;

    fn write_pair(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("dialec.txt"), TXT).unwrap();
        fs::write(dir.join("dialec.kml"), KML).unwrap();
    }

    #[test]
    fn test_same_stem_in_subdirectories_gets_separate_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input");
        write_pair(&input.join("a"));
        write_pair(&input.join("b"));

        let jobs = collect_jobs(&input).unwrap();
        assert_eq!(jobs.len(), 2);

        let converted: Vec<Converted> = jobs
            .iter()
            .map(|job| job.run(&input, false).unwrap())
            .collect();
        let paths: Vec<&Path> = converted
            .iter()
            .flat_map(|c| c.files.iter().map(|(path, _)| path.as_path()))
            .collect();
        assert_eq!(paths, vec![Path::new("a/dialec.csv"), Path::new("b/dialec.csv")]);

        let mut claimed = HashSet::new();
        assert_eq!(claim_outputs(&mut claimed, &converted[0]), None);
        assert_eq!(claim_outputs(&mut claimed, &converted[1]), None);

        let output = temp_dir.path().join("output");
        for c in &converted {
            c.write(&output).unwrap();
        }
        assert!(output.join("a/dialec.csv").is_file());
        assert!(output.join("b/dialec.csv").is_file());
    }

    #[test]
    fn test_colliding_outputs_are_detected() {
        let converted = || Converted {
            files: vec![
                (PathBuf::from("dialec.txt"), Vec::new()),
                (PathBuf::from("dialec.kml"), Vec::new()),
            ],
            stats: Stats::default(),
        };
        let (first, second) = (converted(), converted());

        let mut claimed = HashSet::new();
        assert_eq!(claim_outputs(&mut claimed, &first), None);
        assert_eq!(claim_outputs(&mut claimed, &second), Some(Path::new("dialec.txt")));
    }

    #[test]
    fn test_top_level_dataset_is_not_nested() {
        let temp_dir = TempDir::new().unwrap();
        write_pair(temp_dir.path());

        let jobs = collect_jobs(temp_dir.path()).unwrap();
        let converted = jobs[0].run(temp_dir.path(), true).unwrap();
        assert_eq!(converted.files[0].0, PathBuf::from("dialec-diatech.zip"));
    }
}
