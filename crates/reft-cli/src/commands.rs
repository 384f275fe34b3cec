use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use reft_refs::ReferenceUpdate;
use reft_table::{
    open_mmap, BlockInfo, BlockType, Header, MappedReader, ReaderConfig, ReftableWriter,
    WriteSummary, WriterConfig,
};
use reft_types::{HashAlgorithm, ObjectId};
use serde::Serialize;

use crate::cli::*;
use crate::input::parse_packed_refs;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Write(args) => cmd_write(args, cli.format),
        Command::Read(args) => cmd_read(args, cli.format),
        Command::Lookup(args) => cmd_lookup(args, cli.format),
        Command::Dump(args) => cmd_dump(args, cli.format),
    }
}

/// One ref as printed by `read` and `lookup`.
#[derive(Debug, Serialize)]
struct RefLine {
    name: String,
    update_index: u64,
    update_index_delta: u64,
    oid: Option<ObjectId>,
    peeled: Option<ObjectId>,
}

impl RefLine {
    fn new(update_index_delta: u64, update: &ReferenceUpdate) -> Self {
        Self {
            name: update.name_lossy().into_owned(),
            update_index: update.update_index,
            update_index_delta,
            oid: update.new_oid,
            peeled: update.peeled,
        }
    }

    fn print(&self, hash: HashAlgorithm) {
        match self.oid {
            Some(oid) => println!("{} {}", oid.to_hex().yellow(), self.name),
            None => println!(
                "{} {} {}",
                ObjectId::null(hash).to_hex().dimmed(),
                self.name,
                "(deleted)".red()
            ),
        }
        if let Some(peeled) = self.peeled {
            println!("^{}", peeled.to_hex().yellow());
        }
    }
}

#[derive(Serialize)]
struct Dump<'a> {
    header: &'a Header,
    blocks: &'a [BlockInfo],
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writer settings from the optional TOML file, with flags applied on top.
fn writer_config(
    args: &WriteArgs,
    input_hash: Option<HashAlgorithm>,
) -> anyhow::Result<WriterConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<WriterConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => WriterConfig::default(),
    };
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    if let Some(restart_gap) = args.restart_gap {
        config.restart_gap = restart_gap;
    }
    if let Some(hash) = args.hash.or(input_hash) {
        config.hash = hash;
    }
    if args.no_index {
        config.write_index = false;
    }
    config.validate()?;
    Ok(config)
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("reading stdin")?;
        Ok(text)
    } else {
        fs::read_to_string(input).with_context(|| format!("reading {input}"))
    }
}

fn cmd_write(args: WriteArgs, format: OutputFormat) -> anyhow::Result<()> {
    let text = read_input(&args.input)?;
    let parsed = parse_packed_refs(&text, args.update_index)?;
    let config = writer_config(&args, parsed.hash)?;

    let file = fs::File::create(&args.file)
        .with_context(|| format!("creating {}", args.file.display()))?;
    let mut writer = ReftableWriter::new(file, config)?;
    writer.write_refs(&parsed.updates, &parsed.objects)?;
    let summary = writer.finish()?;
    writer.into_inner()?.sync_all()?;

    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Text => {
            print_summary(&args.file, &summary);
            Ok(())
        }
    }
}

fn print_summary(path: &Path, summary: &WriteSummary) {
    println!(
        "{} Wrote {} refs to {}",
        "✓".green().bold(),
        summary.ref_count.to_string().bold(),
        path.display().to_string().bold()
    );
    println!(
        "  Blocks: {} ref, {} index ({} bytes)",
        summary.ref_blocks, summary.index_blocks, summary.bytes_written
    );
    println!(
        "  Update indexes: {}..={}",
        summary.min_update_index, summary.max_update_index
    );
}

fn open(table: &TableArgs) -> anyhow::Result<MappedReader> {
    let config = ReaderConfig {
        block_size: table.block_size,
        hash: table.hash,
    };
    open_mmap(&table.file, config).with_context(|| format!("opening {}", table.file.display()))
}

fn cmd_read(args: ReadArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut reader = open(&args.table)?;
    let lines: Vec<RefLine> = reader
        .read_all()?
        .iter()
        .map(|(delta, update)| RefLine::new(*delta, update))
        .collect();

    match format {
        OutputFormat::Json => print_json(&lines),
        OutputFormat::Text => {
            for line in &lines {
                line.print(reader.hash());
            }
            Ok(())
        }
    }
}

fn cmd_lookup(args: LookupArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut reader = open(&args.table)?;
    let Some(update) = reader.lookup(args.name.as_bytes())? else {
        bail!("ref {} not found", args.name);
    };
    let delta = update
        .update_index
        .saturating_sub(reader.header().min_update_index);
    let line = RefLine::new(delta, &update);

    match format {
        OutputFormat::Json => print_json(&line),
        OutputFormat::Text => {
            line.print(reader.hash());
            Ok(())
        }
    }
}

fn cmd_dump(args: DumpArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut reader = open(&args.table)?;
    let blocks = reader.blocks()?;
    let header = *reader.header();

    match format {
        OutputFormat::Json => print_json(&Dump {
            header: &header,
            blocks: &blocks,
        }),
        OutputFormat::Text => {
            println!(
                "{} block size {}, update indexes {}..={}",
                "REFT".bold(),
                header.block_size,
                header.min_update_index,
                header.max_update_index
            );
            for block in &blocks {
                let kind = match block.block_type {
                    BlockType::Ref => "ref".green(),
                    BlockType::Index => "index".cyan(),
                };
                println!(
                    "  #{:<4} @{:<8} {:<5} len {:<6} restarts {:<4} records {}",
                    block.index,
                    block.position,
                    kind,
                    block.block_len,
                    block.restart_count,
                    block.record_count
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_args(file: PathBuf, input: &Path) -> WriteArgs {
        WriteArgs {
            file,
            input: input.display().to_string(),
            config: None,
            block_size: None,
            restart_gap: None,
            hash: None,
            update_index: 1,
            no_index: false,
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("reft.toml");
        fs::write(&config_path, "block_size = 4096\nrestart_gap = 8\n").unwrap();

        let mut args = write_args(dir.path().join("out.ref"), Path::new("-"));
        args.config = Some(config_path);
        args.restart_gap = Some(4);
        args.no_index = true;

        let config = writer_config(&args, Some(HashAlgorithm::Sha256)).unwrap();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.restart_gap, 4);
        assert_eq!(config.hash, HashAlgorithm::Sha256);
        assert!(!config.write_index);
    }

    #[test]
    fn invalid_block_size_is_rejected() {
        let mut args = write_args(PathBuf::from("unused.ref"), Path::new("-"));
        args.block_size = Some(4);
        assert!(writer_config(&args, None).is_err());
    }

    #[test]
    fn write_then_read_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let listing = dir.path().join("refs.txt");
        fs::write(
            &listing,
            "2222222222222222222222222222222222222222 refs/tags/v1\n\
             ^1111111111111111111111111111111111111111\n\
             1111111111111111111111111111111111111111 refs/heads/main\n",
        )
        .unwrap();
        let table = dir.path().join("refs.ref");

        let mut args = write_args(table.clone(), &listing);
        args.block_size = Some(256);
        cmd_write(args, OutputFormat::Json).unwrap();

        let table_args = TableArgs {
            file: table,
            block_size: Some(256),
            hash: HashAlgorithm::Sha1,
        };
        let mut reader = open(&table_args).unwrap();
        let refs = reader.read_all().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].1.name, b"refs/heads/main");
        assert!(refs[1].1.knows_peeled());

        let found = reader.lookup(b"refs/tags/v1").unwrap().unwrap();
        assert_eq!(
            found.peeled,
            Some(ObjectId::from_hex("1111111111111111111111111111111111111111").unwrap())
        );

        let lookup = LookupArgs {
            table: table_args,
            name: "refs/heads/missing".into(),
        };
        assert!(cmd_lookup(lookup, OutputFormat::Text).is_err());
    }
}
