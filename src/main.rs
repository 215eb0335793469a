//! The gbasect command-line tool.

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process;

use structopt::StructOpt;

use gbasect::codec;
use gbasect::codec::Bounds;
use gbasect::codec::Codec;
use gbasect::edit::History;
use gbasect::error;
use gbasect::error::Errors;
use gbasect::int;
use gbasect::map::MemoryMap;
use gbasect::project;
use gbasect::project::Project;
use gbasect::rom;
use gbasect::rom::Rom;
use gbasect::scan;
use gbasect::scan::Job;
use gbasect::scan::Placer;
use gbasect::scan::Policy;

#[derive(StructOpt)]
#[structopt(name = "gbasect", about = "Dissects Game Boy Advance ROM images.")]
struct Opts {
  /// Logs more; repeat for even more.
  #[structopt(short, long, parse(from_occurrences))]
  verbose: u8,
  #[structopt(subcommand)]
  cmd: Command,
}

#[derive(StructOpt)]
enum Command {
  /// Prints a ROM's cartridge header.
  Info {
    /// The ROM image.
    rom: PathBuf,
  },
  /// Decodes one block.
  Decode {
    /// The ROM image.
    rom: PathBuf,
    /// The block's codec.
    #[structopt(short, long)]
    codec: Codec,
    /// The block's offset.
    #[structopt(long, parse(try_from_str = parse_int))]
    offset: u32,
    /// The block's length, for raw blocks.
    #[structopt(long, parse(try_from_str = parse_int))]
    length: Option<u32>,
    /// Where to write the decoded bytes; hex-dumps them if missing.
    #[structopt(short, long)]
    output: Option<PathBuf>,
  },
  /// Scans a ROM for compressed blocks.
  Scan(ScanOpts),
  /// Lists the regions of a project.
  Map {
    /// The project file.
    project: PathBuf,
  },
}

#[derive(StructOpt)]
struct ScanOpts {
  /// The ROM image.
  rom: PathBuf,
  /// The codec to scan for.
  #[structopt(short, long)]
  codec: Codec,
  /// The first offset to probe.
  #[structopt(long, parse(try_from_str = parse_int))]
  from: Option<u32>,
  /// The offset to stop at.
  #[structopt(long, parse(try_from_str = parse_int))]
  to: Option<u32>,
  /// The smallest plausible decoded length.
  #[structopt(long, parse(try_from_str = parse_int))]
  min: Option<u32>,
  /// The largest plausible decoded length.
  #[structopt(long, parse(try_from_str = parse_int))]
  max: Option<u32>,
  /// Only probe offsets that are a multiple of this.
  #[structopt(long, default_value = "1", parse(try_from_str = parse_int))]
  align: u32,
  /// Resume after the end of each block found.
  #[structopt(long)]
  skip_valid: bool,
  /// How to place blocks: `split` or `insert`.
  #[structopt(long, default_value = "split")]
  policy: Policy,
  /// A project file to add the blocks to; created if it doesn't exist.
  #[structopt(long)]
  project: Option<PathBuf>,
  /// Stop after this many blocks.
  #[structopt(long)]
  limit: Option<u32>,
}

fn parse_int(s: &str) -> Result<u32, String> {
  int::parse_u32(s).ok_or_else(|| format!("not an integer: {}", s))
}

/// Prints `e` as a diagnostic and exits.
fn die(e: impl error::Error) -> ! {
  let mut errors = Errors::new();
  errors.push(e);
  errors.dump_and_die(1);
  process::exit(1)
}

fn open_rom(path: &Path) -> Rom {
  match Rom::open(path) {
    Ok(rom) => rom,
    Err(e) => {
      eprintln!("error: {}", e);
      eprintln!("  while reading {}", path.display());
      process::exit(1)
    }
  }
}

fn main() {
  let opts = Opts::from_args();

  let level = match opts.verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let env = env_logger::Env::default().default_filter_or(level);
  env_logger::Builder::from_env(env).init();

  let result = match opts.cmd {
    Command::Info { rom } => info(&rom),
    Command::Decode {
      rom,
      codec,
      offset,
      length,
      output,
    } => decode(&rom, codec, offset, length, output.as_deref()),
    Command::Scan(scan_opts) => scan_rom(scan_opts),
    Command::Map { project } => map(&project),
  };
  if let Err(e) = result {
    eprintln!("error: {}", e);
    process::exit(1)
  }
}

fn info(path: &Path) -> io::Result<()> {
  let rom = open_rom(path);
  let mut out = io::stdout();
  writeln!(out, "size:      0x{:x} bytes", rom.len())?;
  match rom.header() {
    Some(header) => {
      writeln!(out, "title:     {}", header.title)?;
      writeln!(out, "game code: {}", header.game_code)?;
      writeln!(out, "maker:     {}", header.maker_code)?;
      writeln!(out, "version:   {}", header.version)?;
      writeln!(
        out,
        "checksum:  0x{:02x} ({})",
        header.complement,
        if header.checksum_ok { "ok" } else { "bad" }
      )?;
    }
    None => writeln!(out, "no cartridge header")?,
  }
  Ok(())
}

fn decode(
  path: &Path,
  codec: Codec,
  offset: u32,
  length: Option<u32>,
  output: Option<&Path>,
) -> io::Result<()> {
  let rom = open_rom(path);
  let region = MemoryMap::new(offset, length).with_codec(codec);
  let (region, bytes) = match codec::resolve(&rom, &region) {
    Ok(decoded) => decoded,
    Err(e) => die(e),
  };

  eprintln!("{}", region);
  match output {
    Some(output) => fs::write(output, &bytes),
    None => rom::dump(&bytes, 0, io::stdout()),
  }
}

fn scan_rom(opts: ScanOpts) -> io::Result<()> {
  let rom = open_rom(&opts.rom);

  let project = match &opts.project {
    Some(path) if path.exists() => match Project::load(path) {
      Ok(project) => project,
      Err(e) => die(e),
    },
    _ => Project::new(&rom),
  };
  if !project.matches(&rom) {
    eprintln!("warning: project doesn't seem to match this ROM");
  }
  let mut partition = match project.partition() {
    Ok(partition) => partition,
    Err(e) => die(project::Error::new(
      opts.project.clone().unwrap_or_default(),
      e.into(),
    )),
  };
  let mut history = History::new();

  let mut options = scan::Options::new(opts.codec);
  options.from = opts.from.unwrap_or(0);
  options.to = opts.to.unwrap_or_else(|| rom.len());
  options.bounds = Bounds::new(opts.min, opts.max);
  options.align = opts.align;
  options.skip_valid_blocks = opts.skip_valid;

  let mut placer = match opts.policy {
    Policy::Split => Placer::split(),
    Policy::Insert => {
      let parent = match partition.containing(options.from) {
        Some((_, parent)) if parent.is_unclassified() => parent.clone(),
        _ => {
          eprintln!(
            "error: no unclassified region at 0x{:08x} to insert into",
            options.from
          );
          process::exit(1)
        }
      };
      options.to = options.to.min(parent.byte_end() as u32);
      Placer::insert(parent)
    }
  };

  let handle = Job::new(rom, options).spawn(64)?;
  let mut found = 0;
  for candidate in handle.iter() {
    found += 1;
    if opts.limit.map_or(false, |limit| found >= limit) {
      handle.cancel();
    }
    let shown = candidate.to_string();
    if placer.place(candidate, &mut partition, &mut history) {
      println!("+ {}", shown);
    }
  }
  let (rest, summary) = handle.finish();
  for candidate in rest {
    placer.place(candidate, &mut partition, &mut history);
  }

  let report = match placer.finish(&mut partition, &mut history) {
    Ok(report) => report,
    Err(e) => die(e),
  };

  let mut rejected = Errors::new();
  for rejection in report.rejected.iter().cloned() {
    rejected.push(rejection);
  }
  if rejected.dump_to(io::stderr())? {
    eprintln!();
  }
  println!(
    "{}: probed {} offsets, added {} blocks, rejected {}",
    summary.status,
    summary.probed,
    report.added.len(),
    report.rejected.len()
  );

  if let Some(path) = &opts.project {
    let game_code = project.game_code.clone();
    let updated = Project::from_partition(&partition, game_code);
    if let Err(e) = updated.save(path) {
      die(e)
    }
  }
  Ok(())
}

fn map(path: &Path) -> io::Result<()> {
  let project = match Project::load(path) {
    Ok(project) => project,
    Err(e) => die(e),
  };
  let partition = match project.partition() {
    Ok(partition) => partition,
    Err(e) => die(project::Error::new(path, e.into())),
  };

  let mut out = io::stdout();
  for region in partition.regions() {
    writeln!(out, "{}", region)?;
  }

  let classified = partition
    .regions()
    .iter()
    .filter(|r| !r.is_unclassified())
    .count();
  writeln!(
    out,
    "{} regions, {} classified",
    partition.len(),
    classified
  )?;
  for gap in partition.gaps() {
    writeln!(out, "gap: 0x{:08x}..0x{:08x}", gap.start, gap.end)?;
  }
  Ok(())
}
