//! Probing ROMs for compressed blocks.
//!
//! A scan runs a codec's dry-run at every offset in a range, reporting every
//! offset where it succeeds as a *candidate* region. Scans can run inline,
//! through [`scan()`], or as a background [`Job`] that hands candidates to
//! the calling thread over a bounded channel. Either way, the scan never
//! touches a [`Partition`]: the consumer decides what to do with each
//! candidate, usually by handing it to a [`Placer`].
//!
//! [`scan()`]: fn.scan.html
//! [`Job`]: struct.Job.html
//! [`Partition`]: ../map/struct.Partition.html
//! [`Placer`]: struct.Placer.html

use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use log::debug;
use log::info;
use log::trace;
use log::warn;

use crate::codec::Bounds;
use crate::codec::Cancel;
use crate::codec::Codec;
use crate::codec::DryRun;
use crate::edit;
use crate::edit::Edit;
use crate::edit::History;
use crate::error;
use crate::map::DataType;
use crate::map::MemoryMap;
use crate::map::Partition;
use crate::rom::Cursor;
use crate::rom::Rom;

/// What to scan for, and where.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Options {
  /// The codec to probe with.
  pub codec: Codec,
  /// The first offset to probe.
  pub from: u32,
  /// The offset to stop probing at, exclusive. Clamped to the ROM.
  pub to: u32,
  /// Bounds on the decompressed length of a hit.
  pub bounds: Bounds,
  /// Whether to resume after the end of each hit, rather than at the next
  /// offset.
  pub skip_valid_blocks: bool,
  /// Only offsets that are a multiple of this are probed.
  pub align: u32,
}

impl Options {
  /// Creates `Options` that scan the whole ROM for `codec`.
  pub fn new(codec: Codec) -> Self {
    Self {
      codec,
      from: 0,
      to: u32::MAX,
      bounds: Bounds::ANY,
      skip_valid_blocks: false,
      align: 1,
    }
  }
}

/// The lifecycle of a scan job.
///
/// A job goes `Created -> Running -> {Succeeded, Cancelled} -> Finished`,
/// where `Finished` means its results have been collected.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum State {
  /// The job hasn't started yet.
  Created,
  /// The job is probing.
  Running,
  /// The job probed its whole range.
  Succeeded,
  /// The job was asked to stop, or its consumer went away.
  Cancelled,
  /// The job's results have been collected.
  Finished,
}

impl State {
  fn from_u8(v: u8) -> Self {
    match v {
      0 => Self::Created,
      1 => Self::Running,
      2 => Self::Succeeded,
      3 => Self::Cancelled,
      _ => Self::Finished,
    }
  }
}

impl fmt::Display for State {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let name = match self {
      Self::Created => "created",
      Self::Running => "running",
      Self::Succeeded => "succeeded",
      Self::Cancelled => "cancelled",
      Self::Finished => "finished",
    };
    f.write_str(name)
  }
}

/// What a finished scan did.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Summary {
  /// Either `State::Succeeded` or `State::Cancelled`.
  pub status: State,
  /// The number of offsets probed.
  pub probed: u32,
  /// The number of candidates found.
  pub found: u32,
}

/// A shared cancellation flag.
///
/// Clones share the same flag.
#[derive(Clone, Default, Debug)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  /// Creates a new, unset token.
  pub fn new() -> Self {
    Self::default()
  }

  /// Asks whatever is polling this token to stop.
  pub fn cancel(&self) {
    self.0.store(true, Ordering::Relaxed)
  }
}

impl Cancel for CancelToken {
  fn is_cancelled(&self) -> bool {
    self.0.is_cancelled()
  }
}

fn align_up(offset: u64, align: u64) -> u64 {
  (offset + align - 1) / align * align
}

/// Scans `rom` on the current thread.
///
/// Each candidate is passed to `emit` as soon as it's found; if `emit`
/// returns `false`, the scan stops as if it had been cancelled. `cancel` is
/// polled before every probe, and by the codec as it walks each stream.
pub fn scan(
  rom: &[u8],
  options: &Options,
  cancel: &dyn Cancel,
  mut emit: impl FnMut(MemoryMap) -> bool,
) -> Summary {
  let codec = options.codec;
  let align = options.align.max(1) as u64;
  let end = (options.to as u64).min(rom.len() as u64);

  let mut summary = Summary {
    status: State::Succeeded,
    probed: 0,
    found: 0,
  };

  let mut offset = align_up(options.from as u64, align);
  while offset < end {
    if cancel.is_cancelled() {
      summary.status = State::Cancelled;
      break;
    }
    summary.probed += 1;

    let mut cursor = Cursor::at(rom, offset as usize);
    let mut next = offset + align;
    match codec.dryrun(&mut cursor, options.bounds, cancel) {
      Ok(DryRun::Sized(sizes)) => {
        let candidate = MemoryMap {
          byte_offset: offset as u32,
          byte_length: Some(sizes.consumed),
          byte_codec: Some(codec),
          byte_payload: Some(sizes.decoded),
          ..MemoryMap::default()
        };
        debug!("found {}", candidate);
        summary.found += 1;
        if !emit(candidate) {
          summary.status = State::Cancelled;
          break;
        }
        if options.skip_valid_blocks {
          next = align_up(offset + sizes.consumed as u64, align).max(next);
        }
      }
      Ok(DryRun::Cancelled) => {
        summary.status = State::Cancelled;
        break;
      }
      Err(e) => trace!("no {} at 0x{:08x}: {}", codec, offset, e),
    }
    offset = next;
  }
  summary
}

/// A scan that runs on its own thread.
#[derive(Debug)]
pub struct Job {
  rom: Rom,
  options: Options,
  state: Arc<AtomicU8>,
  cancel: CancelToken,
}

impl Job {
  /// Creates a new job, which won't start until `spawn()` is called.
  pub fn new(rom: Rom, options: Options) -> Self {
    Self {
      rom,
      options,
      state: Arc::new(AtomicU8::new(State::Created as u8)),
      cancel: CancelToken::new(),
    }
  }

  /// Returns this job's current state.
  pub fn state(&self) -> State {
    State::from_u8(self.state.load(Ordering::Acquire))
  }

  /// Returns a token that cancels this job.
  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  /// Starts this job on a new thread.
  ///
  /// At most `capacity` candidates are queued; once the queue is full, the
  /// worker waits for the consumer to catch up.
  pub fn spawn(self, capacity: usize) -> io::Result<Handle> {
    let (tx, rx) = mpsc::sync_channel(capacity);
    let Job {
      rom,
      options,
      state,
      cancel,
    } = self;

    info!(
      "scanning 0x{:08x}..0x{:08x} for {}",
      options.from,
      options.to.min(rom.len()),
      options.codec
    );
    state.store(State::Running as u8, Ordering::Release);

    let worker_state = Arc::clone(&state);
    let worker_cancel = cancel.clone();
    let thread = thread::Builder::new()
      .name(format!("scan-{}", options.codec))
      .spawn(move || {
        let summary = scan(&rom, &options, &worker_cancel, |candidate| {
          tx.send(candidate).is_ok()
        });
        worker_state.store(summary.status as u8, Ordering::Release);
        summary
      })?;

    Ok(Handle {
      state,
      cancel,
      rx,
      thread,
    })
  }
}

/// A handle to a running [`Job`](struct.Job.html).
#[derive(Debug)]
pub struct Handle {
  state: Arc<AtomicU8>,
  cancel: CancelToken,
  rx: mpsc::Receiver<MemoryMap>,
  thread: thread::JoinHandle<Summary>,
}

impl Handle {
  /// Asks the job to stop. Candidates it already found are still delivered.
  pub fn cancel(&self) {
    self.cancel.cancel()
  }

  /// Returns the job's current state.
  pub fn state(&self) -> State {
    State::from_u8(self.state.load(Ordering::Acquire))
  }

  /// Waits for the next candidate, returning `None` once the job has stopped
  /// and every candidate has been received.
  pub fn recv(&self) -> Option<MemoryMap> {
    self.rx.recv().ok()
  }

  /// Returns the next candidate, if one is ready.
  pub fn try_recv(&self) -> Option<MemoryMap> {
    self.rx.try_recv().ok()
  }

  /// Returns an iterator that waits for each candidate in turn.
  pub fn iter(&self) -> impl Iterator<Item = MemoryMap> + '_ {
    self.rx.iter()
  }

  /// Waits for the job to stop, returning any candidates not yet received.
  pub fn finish(self) -> (Vec<MemoryMap>, Summary) {
    let rest = self.rx.iter().collect::<Vec<_>>();
    let summary = match self.thread.join() {
      Ok(summary) => summary,
      Err(panic) => std::panic::resume_unwind(panic),
    };
    self.state.store(State::Finished as u8, Ordering::Release);
    info!(
      "scan {}: probed {} offsets, found {} candidates",
      summary.status, summary.probed, summary.found
    );
    (rest, summary)
  }
}

/// How found candidates are placed into a partition.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Policy {
  /// Remove the scanned region on the first hit, insert each candidate that
  /// doesn't overlap a previous one, and fill the holes with unknown regions.
  Insert,
  /// Carve each candidate out of whatever unclassified region contains it.
  Split,
}

impl FromStr for Policy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, String> {
    match s.to_ascii_lowercase().as_str() {
      "insert" => Ok(Self::Insert),
      "split" => Ok(Self::Split),
      _ => Err(format!("unknown policy: {}", s)),
    }
  }
}

/// Why a candidate wasn't placed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Reason {
  /// No region contains the candidate's offset.
  NoParent,
  /// The containing region is encoded with the given codec.
  ParentNotRaw(Codec),
  /// The containing region already has the given data type.
  ParentClassified(DataType),
  /// The candidate overlaps the region at the given offset.
  Overlap(u32),
  /// The edit placing the candidate failed.
  Edit(edit::Error),
}

impl fmt::Display for Reason {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::NoParent => write!(f, "no region to place it in"),
      Self::ParentNotRaw(codec) => write!(f, "parent is already {}", codec),
      Self::ParentClassified(ty) => write!(f, "parent is already {}", ty),
      Self::Overlap(offset) => {
        write!(f, "overlaps region at 0x{:08x}", offset)
      }
      Self::Edit(e) => write!(f, "{}", e),
    }
  }
}

/// A candidate that wasn't placed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Rejection {
  /// The candidate.
  pub region: MemoryMap,
  /// Why it wasn't placed.
  pub reason: Reason,
}

impl fmt::Display for Rejection {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "{} block at 0x{:08x} not added: {}",
      self.region.codec(),
      self.region.byte_offset,
      self.reason
    )
  }
}

impl error::Error for Rejection {
  fn cause(&self) -> error::Cause<'_> {
    error::Cause::Offset(self.region.byte_offset)
  }

  fn action(&self) -> Option<error::Action> {
    Some(error::Action::Scanning)
  }
}

/// What a `Placer` did with the candidates it was given.
#[derive(Clone, Default, Debug)]
pub struct Report {
  /// Candidates that made it into the partition.
  pub added: Vec<MemoryMap>,
  /// Candidates that didn't.
  pub rejected: Vec<Rejection>,
}

/// Applies scan candidates to a partition, according to a `Policy`.
///
/// Every change goes through a `History`, so a whole scan can be undone.
#[derive(Debug)]
pub struct Placer {
  policy: Policy,
  parent: Option<MemoryMap>,
  removed: bool,
  report: Report,
}

impl Placer {
  /// Creates a placer with the `Split` policy.
  pub fn split() -> Self {
    Self {
      policy: Policy::Split,
      parent: None,
      removed: false,
      report: Report::default(),
    }
  }

  /// Creates a placer with the `Insert` policy, which replaces `parent`.
  pub fn insert(parent: MemoryMap) -> Self {
    Self {
      policy: Policy::Insert,
      parent: Some(parent),
      removed: false,
      report: Report::default(),
    }
  }

  /// Returns this placer's policy.
  pub fn policy(&self) -> Policy {
    self.policy
  }

  /// Tries to place `candidate`, recording the outcome.
  ///
  /// Returns whether it was placed.
  pub fn place(
    &mut self,
    candidate: MemoryMap,
    partition: &mut Partition,
    history: &mut History,
  ) -> bool {
    let placed = match self.policy {
      Policy::Split => split_into(&candidate, partition, history),
      Policy::Insert => self.insert_into(&candidate, partition, history),
    };

    match placed {
      Ok(()) => {
        self.report.added.push(candidate);
        true
      }
      Err(reason) => {
        let rejection = Rejection {
          region: candidate,
          reason,
        };
        warn!("{}", rejection);
        self.report.rejected.push(rejection);
        false
      }
    }
  }

  fn insert_into(
    &mut self,
    candidate: &MemoryMap,
    partition: &mut Partition,
    history: &mut History,
  ) -> Result<(), Reason> {
    let parent = match &self.parent {
      Some(parent) => parent,
      None => return Err(Reason::NoParent),
    };
    if candidate.byte_offset < parent.byte_offset
      || candidate.byte_end() > parent.byte_end()
    {
      return Err(Reason::NoParent);
    }

    if !self.removed {
      let remove = Edit::Remove {
        region: parent.clone(),
      };
      history.apply(remove, partition).map_err(Reason::Edit)?;
      self.removed = true;
    }

    if let Some(other) = first_overlap(partition, candidate) {
      return Err(Reason::Overlap(other));
    }
    let insert = Edit::Insert {
      region: candidate.clone(),
    };
    history.apply(insert, partition).map_err(Reason::Edit)
  }

  /// Finishes placement, returning what happened.
  ///
  /// With the `Insert` policy, this fills whatever the candidates didn't
  /// cover of the removed parent with unknown regions.
  pub fn finish(
    self,
    partition: &mut Partition,
    history: &mut History,
  ) -> Result<Report, edit::Error> {
    if let (Policy::Insert, true, Some(parent)) =
      (self.policy, self.removed, &self.parent)
    {
      let start = parent.byte_offset;
      let end = parent.byte_end();
      for gap in partition.gaps() {
        let gap_start = gap.start.max(start);
        let gap_end = (gap.end as u64).min(end);
        if (gap_start as u64) < gap_end {
          let filler = MemoryMap::span(gap_start, gap_end as u32);
          history.apply(Edit::Insert { region: filler }, partition)?;
        }
      }
    }

    info!(
      "placed {} candidates, rejected {}",
      self.report.added.len(),
      self.report.rejected.len()
    );
    Ok(self.report)
  }
}

fn split_into(
  candidate: &MemoryMap,
  partition: &mut Partition,
  history: &mut History,
) -> Result<(), Reason> {
  let parent = match partition.containing(candidate.byte_offset) {
    Some((_, parent)) => parent.clone(),
    None => return Err(Reason::NoParent),
  };
  if parent.codec() != Codec::Raw {
    return Err(Reason::ParentNotRaw(parent.codec()));
  }
  if parent.data_type() != DataType::Unknown {
    return Err(Reason::ParentClassified(parent.data_type()));
  }

  let edit = Edit::extract(parent, candidate.clone()).map_err(Reason::Edit)?;
  history.apply(edit, partition).map_err(Reason::Edit)
}

/// Returns the offset of the first region overlapping `region`.
fn first_overlap(partition: &Partition, region: &MemoryMap) -> Option<u32> {
  let idx = partition.insertion_index(region.byte_offset);
  let regions = partition.regions();
  let before = idx.checked_sub(1).map(|i| &regions[i]);
  before
    .into_iter()
    .chain(regions.get(idx))
    .find(|other| other.overlaps(region))
    .map(|other| other.byte_offset)
}

#[cfg(test)]
mod test {
  use super::*;

  const RLE: [u8; 10] = [0x30, 0x08, 0x00, 0x00, 0x82, 0xaa, 0x02, 1, 2, 3];

  /// Builds a ROM of `len` bytes of filler with a run-length stream at each
  /// of `offsets`.
  fn rom_with_streams(len: usize, offsets: &[usize]) -> Vec<u8> {
    let mut rom = vec![0xffu8; len];
    for &offset in offsets {
      rom[offset..offset + RLE.len()].copy_from_slice(&RLE);
    }
    rom
  }

  fn hit(offset: u32) -> MemoryMap {
    MemoryMap {
      byte_offset: offset,
      byte_length: Some(10),
      byte_codec: Some(Codec::RunLength),
      byte_payload: Some(8),
      ..MemoryMap::default()
    }
  }

  fn collect(rom: &[u8], options: &Options) -> (Vec<MemoryMap>, Summary) {
    let mut found = Vec::new();
    let summary = scan(rom, options, &crate::codec::Never, |c| {
      found.push(c);
      true
    });
    (found, summary)
  }

  #[test]
  fn finds_streams() {
    let rom = rom_with_streams(0x80, &[0x10, 0x40]);
    let (found, summary) = collect(&rom, &Options::new(Codec::RunLength));
    assert_eq!(found, vec![hit(0x10), hit(0x40)]);
    assert_eq!(summary.status, State::Succeeded);
    assert_eq!(summary.probed, 0x80);
    assert_eq!(summary.found, 2);
  }

  #[test]
  fn range_align_and_bounds() {
    let rom = rom_with_streams(0x80, &[0x10, 0x41]);

    let mut options = Options::new(Codec::RunLength);
    options.from = 0x11;
    options.to = 0x42;
    assert_eq!(collect(&rom, &options).0, vec![hit(0x41)]);

    options.to = 0x41;
    assert_eq!(collect(&rom, &options).0, vec![]);

    let mut options = Options::new(Codec::RunLength);
    options.align = 4;
    let (found, summary) = collect(&rom, &options);
    assert_eq!(found, vec![hit(0x10)]);
    assert_eq!(summary.probed, 0x20);

    let mut options = Options::new(Codec::RunLength);
    options.bounds = Bounds::new(Some(9), None);
    assert_eq!(collect(&rom, &options).0, vec![]);
  }

  #[test]
  fn skipping_valid_blocks() {
    // A stream of ten literals, which happen to form a stream of their own.
    let outer = [
      0x30, 0x0a, 0x00, 0x00, 0x09, 0x30, 0x04, 0x00, 0x00, 0x81, 0x55, 0x00,
      0x00, 0x00, 0x00,
    ];
    let mut rom = vec![0xffu8; 0x20];
    rom[..outer.len()].copy_from_slice(&outer);

    let mut options = Options::new(Codec::RunLength);
    let (found, _) = collect(&rom, &options);
    let offsets = found.iter().map(|r| r.byte_offset).collect::<Vec<_>>();
    assert_eq!(offsets, vec![0, 5]);
    assert_eq!(found[0].byte_length, Some(15));
    assert_eq!(found[1].byte_length, Some(6));

    options.skip_valid_blocks = true;
    let (found, summary) = collect(&rom, &options);
    assert_eq!(found.len(), 1);
    assert_eq!(summary.probed, 1 + 0x20 - 15);
  }

  #[test]
  fn consumer_can_stop_the_scan() {
    let rom = rom_with_streams(0x80, &[0x10, 0x40]);
    let summary =
      scan(&rom, &Options::new(Codec::RunLength), &crate::codec::Never, |_| {
        false
      });
    assert_eq!(summary.status, State::Cancelled);
    assert_eq!(summary.found, 1);
    assert_eq!(summary.probed, 0x11);
  }

  #[test]
  fn background_job() {
    let rom = rom_with_streams(0x100, &[0x10, 0x40, 0x80]);
    let expected = collect(&rom, &Options::new(Codec::RunLength)).0;

    let job = Job::new(Rom::new(rom), Options::new(Codec::RunLength));
    assert_eq!(job.state(), State::Created);
    let handle = job.spawn(1).unwrap();

    let first = handle.recv().unwrap();
    assert_eq!(first, expected[0]);
    let (rest, summary) = handle.finish();
    assert_eq!(rest, expected[1..]);
    assert_eq!(summary.status, State::Succeeded);
    assert_eq!(summary.found, 3);
  }

  #[test]
  fn cancelled_job_delivers_whole_candidates() {
    let offsets = (0..64).map(|i| i * 0x10).collect::<Vec<_>>();
    let rom = rom_with_streams(0x400, &offsets);

    let job = Job::new(Rom::new(rom), Options::new(Codec::RunLength));
    let state = Arc::clone(&job.state);
    let handle = job.spawn(1).unwrap();

    let first = handle.recv().unwrap();
    handle.cancel();
    let (rest, summary) = handle.finish();
    assert_eq!(State::from_u8(state.load(Ordering::Acquire)), State::Finished);

    assert_eq!(summary.status, State::Cancelled);
    assert!(summary.found < 64);
    assert_eq!(rest.len() + 1, summary.found as usize);
    for (i, candidate) in Some(first).into_iter().chain(rest).enumerate() {
      assert_eq!(candidate, hit(i as u32 * 0x10));
    }
  }

  #[test]
  fn cancelled_before_start() {
    let job = Job::new(
      Rom::new(rom_with_streams(0x40, &[0])),
      Options::new(Codec::RunLength),
    );
    job.cancel_token().cancel();
    let handle = job.spawn(4).unwrap();
    let (rest, summary) = handle.finish();
    assert!(rest.is_empty());
    assert_eq!(summary.status, State::Cancelled);
    assert_eq!(summary.probed, 0);
  }

  #[test]
  fn split_policy() {
    let mut p = Partition::from_regions(
      0x100,
      vec![
        MemoryMap::span(0x00, 0x20).with_data_type(DataType::Padding),
        MemoryMap::span(0x20, 0x80),
        MemoryMap::span(0x90, 0x100),
      ],
    )
    .unwrap();
    let mut history = History::new();
    let mut placer = Placer::split();

    assert!(placer.place(hit(0x30), &mut p, &mut history));
    assert!(!placer.place(hit(0x34), &mut p, &mut history));
    assert!(!placer.place(hit(0x10), &mut p, &mut history));
    assert!(!placer.place(hit(0x88), &mut p, &mut history));
    assert!(!placer.place(hit(0x7a), &mut p, &mut history));
    assert!(placer.place(hit(0x90), &mut p, &mut history));

    let report = placer.finish(&mut p, &mut history).unwrap();
    assert_eq!(report.added, vec![hit(0x30), hit(0x90)]);
    let reasons = report
      .rejected
      .iter()
      .map(|r| r.reason.clone())
      .collect::<Vec<_>>();
    assert_eq!(reasons[0], Reason::ParentNotRaw(Codec::RunLength));
    assert_eq!(reasons[1], Reason::ParentClassified(DataType::Padding));
    assert_eq!(reasons[2], Reason::NoParent);
    assert!(matches!(reasons[3], Reason::Edit(_)));

    p.validate().unwrap();
    assert_eq!(p.get(0x30), Some(&hit(0x30)));
    assert_eq!(p.len(), 6);

    while history.can_undo() {
      history.undo(&mut p).unwrap();
    }
    assert_eq!(p.len(), 3);
  }

  #[test]
  fn insert_policy() {
    let original = Partition::new(0x100);
    let mut p = original.clone();
    let mut history = History::new();
    let mut placer = Placer::insert(p.regions()[0].clone());

    assert!(placer.place(hit(0x20), &mut p, &mut history));
    assert!(p.gaps().len() == 2);
    assert!(!placer.place(hit(0x24), &mut p, &mut history));
    assert!(placer.place(hit(0x2a), &mut p, &mut history));
    assert!(!placer.place(hit(0xfa), &mut p, &mut history));

    let report = placer.finish(&mut p, &mut history).unwrap();
    assert_eq!(report.added, vec![hit(0x20), hit(0x2a)]);
    assert_eq!(report.rejected[0].reason, Reason::Overlap(0x20));
    assert_eq!(report.rejected[1].reason, Reason::NoParent);

    p.validate().unwrap();
    assert!(p.gaps().is_empty());
    let spans = p
      .regions()
      .iter()
      .map(|r| (r.byte_offset, r.byte_end(), r.is_unclassified()))
      .collect::<Vec<_>>();
    assert_eq!(
      spans,
      vec![
        (0x00, 0x20, true),
        (0x20, 0x2a, false),
        (0x2a, 0x34, false),
        (0x34, 0x100, true),
      ]
    );

    while history.can_undo() {
      history.undo(&mut p).unwrap();
    }
    assert_eq!(p, original);
  }

  #[test]
  fn insert_policy_without_hits_changes_nothing() {
    let mut p = Partition::new(0x100);
    let mut history = History::new();
    let placer = Placer::insert(p.regions()[0].clone());
    let report = placer.finish(&mut p, &mut history).unwrap();
    assert!(report.added.is_empty());
    assert_eq!(p, Partition::new(0x100));
    assert!(!history.can_undo());
  }
}
