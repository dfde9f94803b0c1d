//! Adaptive write-back buffering
//!
//! ## Architecture
//!
//! ```text
//! WriteBufferProxy
//!   ├── config: WriteBufferConfig
//!   ├── worker: JoinHandle<()>
//!   └── shared: Arc<Shared>
//!       ├── writer: PassThruProxy        - the wrapped endpoint
//!       ├── atoms / values: WriteQueue   - pending stores, deduplicated
//!       ├── high_water                   - producer throttle threshold
//!       └── shutdown                     - stop flag + condvar
//! ```
//!
//! `store_atom` and `store_value` only enqueue. A single background worker
//! wakes once per tick and writes a fraction `tick / decay` of each queue,
//! so a queue with no further inflow empties in roughly `decay`. When a
//! cycle overruns its tick the high-water mark is pulled down to what the
//! observed write rate can clear; producers finding a queue above it
//! sleep for one tick. When cycles finish early the mark relaxes upward.
//!
//! `barrier()` and `close()` drain both queues synchronously.

use super::queue::{Closed, WriteQueue};
use super::PassThruProxy;
use crate::registry::ProxyType;
use crate::{Capabilities, ProxyParameters, Registry, Result, StorageError, StorageNode};
use atomstore_graph::{AtomSpace, AtomType, Handle, Value};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Initial (and maximum) high-water mark
const HIGH_WATER_MAX: usize = 1_000_000_000;

/// Smallest batch worth writing, and the lowest high-water mark
const MIN_WRITE: usize = 1000;

/// Exponential smoothing weight for the moving averages
const SMOOTHING: f64 = 0.1;

/// Headroom over the measured write rate when sizing the high-water mark
const DUTY_TARGET: f64 = 1.2;

const MAX_TICK: Duration = Duration::from_secs(10);

// ============================================================================
// WriteBufferConfig
// ============================================================================

/// Timing configuration for the write buffer
///
/// A `decay` in the proxy's parameter record takes precedence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteBufferConfig {
    /// Time for an idle queue to drain to near-empty. Default: 30s
    pub decay: Duration,
}

impl Default for WriteBufferConfig {
    fn default() -> Self {
        Self {
            decay: Duration::from_secs(30),
        }
    }
}

impl WriteBufferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decay(mut self, decay: Duration) -> Self {
        self.decay = decay;
        self
    }

    /// Drain period: a quarter of the decay time, at most ten seconds
    pub fn tick(&self) -> Duration {
        (self.decay / 4).min(MAX_TICK)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Moving averages for one queue, in entries per tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueAverages {
    pub inflow: f64,
    pub occupancy: f64,
    pub outflow: f64,
}

/// Snapshot of the write buffer's state
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBufferStats {
    pub decay: Duration,
    pub tick: Duration,
    pub atoms_pending: usize,
    pub values_pending: usize,
    pub high_water: usize,
    pub atoms: QueueAverages,
    pub values: QueueAverages,
    /// Moving average of the fraction of each tick spent writing
    pub duty_cycle: f64,
    pub atoms_written: u64,
    pub values_written: u64,
    /// Producer sleeps caused by the high-water mark
    pub stalls: u64,
    pub failure: Option<String>,
}

#[derive(Debug, Default)]
struct Averages {
    atoms: QueueAverages,
    values: QueueAverages,
    duty_cycle: f64,
}

fn smooth(average: f64, sample: f64) -> f64 {
    (1.0 - SMOOTHING) * average + SMOOTHING * sample
}

// ============================================================================
// Shutdown signal
// ============================================================================

#[derive(Debug, Default)]
struct Shutdown {
    stop: Mutex<bool>,
    wake: Condvar,
}

impl Shutdown {
    fn trigger(&self) {
        *self.stop.lock() = true;
        self.wake.notify_all();
    }

    fn reset(&self) {
        *self.stop.lock() = false;
    }

    fn is_triggered(&self) -> bool {
        *self.stop.lock()
    }

    /// Sleep for `timeout` unless triggered first; returns whether triggered
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stop = self.stop.lock();
        while !*stop {
            if self.wake.wait_until(&mut stop, deadline).timed_out() {
                break;
            }
        }
        *stop
    }
}

// ============================================================================
// Shared state
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Timing {
    decay: Duration,
    tick: Duration,
}

impl Timing {
    fn frac(&self) -> f64 {
        self.tick.as_secs_f64() / self.decay.as_secs_f64()
    }
}

/// State shared between the proxy and its drain worker
struct Shared {
    writer: PassThruProxy,
    atoms: WriteQueue<Handle>,
    values: WriteQueue<(Handle, Handle)>,
    high_water: AtomicUsize,
    timing: RwLock<Timing>,
    atom_inflow: AtomicU64,
    value_inflow: AtomicU64,
    averages: Mutex<Averages>,
    atoms_written: AtomicU64,
    values_written: AtomicU64,
    stalls: AtomicU64,
    /// Held while entries are between their queue and the writer
    flush_lock: Mutex<()>,
    shutdown: Shutdown,
    failure: Mutex<Option<String>>,
    /// Atoms pulled from the queue by a pending removal, by removed atom
    evicted: Mutex<HashMap<Handle, Vec<Handle>>>,
}

impl Shared {
    fn name(&self) -> &str {
        self.writer.name()
    }

    fn timing(&self) -> Timing {
        *self.timing.read()
    }

    fn check_failed(&self) -> Result<()> {
        match &*self.failure.lock() {
            Some(reason) => Err(StorageError::Failed(format!(
                "write buffer {} has failed: {}",
                self.name(),
                reason
            ))),
            None => Ok(()),
        }
    }

    /// Write up to `limit` entries; the caller holds `flush_lock`
    ///
    /// An entry whose write fails goes back to the head of its queue.
    fn write_batch<T: Clone + Eq + Hash>(
        &self,
        queue: &WriteQueue<T>,
        limit: usize,
        written: &AtomicU64,
        write: impl Fn(&T) -> Result<()>,
    ) -> Result<usize> {
        let mut count = 0;
        while count < limit {
            let Some(item) = queue.pop() else {
                break;
            };
            if let Err(err) = write(&item) {
                queue.push_front(item);
                written.fetch_add(count as u64, Ordering::Relaxed);
                return Err(err);
            }
            count += 1;
        }
        written.fetch_add(count as u64, Ordering::Relaxed);
        Ok(count)
    }

    fn write_atoms(&self, limit: usize) -> Result<usize> {
        self.write_batch(&self.atoms, limit, &self.atoms_written, |atom| {
            self.writer.store_atom(atom)
        })
    }

    fn write_values(&self, limit: usize) -> Result<usize> {
        self.write_batch(&self.values, limit, &self.values_written, |(atom, key)| {
            self.writer.store_value(atom, key)
        })
    }

    /// Write everything pending, atoms first
    fn flush(&self) -> Result<()> {
        let _flush = self.flush_lock.lock();
        self.write_atoms(usize::MAX)?;
        self.write_values(usize::MAX)?;
        Ok(())
    }

    /// One drain step for a queue; returns the number of entries written
    fn drain_step(
        &self,
        frac: f64,
        pending: usize,
        inflow: &AtomicU64,
        averages: impl Fn(&mut Averages) -> &mut QueueAverages,
        write: impl FnOnce(usize) -> Result<usize>,
    ) -> Result<usize> {
        let arrived = inflow.swap(0, Ordering::Relaxed) as f64;
        let qsz = pending as f64;

        let nwrite = {
            let mut all = self.averages.lock();
            let avg = averages(&mut all);
            avg.inflow = smooth(avg.inflow, arrived);
            avg.occupancy = smooth(avg.occupancy, qsz);
            let floor = ((0.5 * frac * avg.occupancy).ceil() as usize).max(MIN_WRITE);
            ((frac * qsz).ceil() as usize).max(floor)
        };

        let written = if pending == 0 {
            0
        } else {
            let _flush = self.flush_lock.lock();
            write(nwrite)?
        };

        let mut all = self.averages.lock();
        let avg = averages(&mut all);
        avg.outflow = smooth(avg.outflow, written as f64);
        Ok(written)
    }

    fn drain_cycle(&self, timing: Timing) -> Result<usize> {
        let frac = timing.frac();
        let atoms = self.drain_step(
            frac,
            self.atoms.len(),
            &self.atom_inflow,
            |all| &mut all.atoms,
            |n| self.write_atoms(n),
        )?;
        let values = self.drain_step(
            frac,
            self.values.len(),
            &self.value_inflow,
            |all| &mut all.values,
            |n| self.write_values(n),
        )?;
        Ok(atoms + values)
    }

    /// Background worker body; runs until shutdown or a write failure
    fn drain_loop(&self) {
        let timing = self.timing();
        debug!(proxy = %self.name(), tick = ?timing.tick, "write-back worker started");

        if self.shutdown.wait(timing.tick) {
            return;
        }
        loop {
            let start = Instant::now();
            let written = match self.drain_cycle(timing) {
                Ok(written) => written,
                Err(err) => {
                    error!(proxy = %self.name(), error = %err, "write-back failed; buffer disabled");
                    *self.failure.lock() = Some(err.to_string());
                    return;
                }
            };
            let elapsed = start.elapsed();

            {
                let mut all = self.averages.lock();
                all.duty_cycle = smooth(
                    all.duty_cycle,
                    elapsed.as_secs_f64() / timing.tick.as_secs_f64(),
                );
            }
            debug!(
                proxy = %self.name(),
                written,
                atoms = self.atoms.len(),
                values = self.values.len(),
                elapsed = ?elapsed,
                "write-back cycle"
            );

            if elapsed < timing.tick {
                let hwm = self.high_water.load(Ordering::Relaxed);
                let relaxed = (hwm.saturating_mul(17) / 16).min(HIGH_WATER_MAX);
                self.high_water.store(relaxed, Ordering::Relaxed);

                if self.shutdown.wait(timing.tick - elapsed) {
                    return;
                }
            } else {
                // Entries the writer can clear in one tick at the observed rate
                let per_tick = written as f64 * timing.tick.as_secs_f64() / elapsed.as_secs_f64();
                let hwm = ((DUTY_TARGET * per_tick / timing.frac()).ceil() as usize).max(MIN_WRITE);
                self.high_water.store(hwm, Ordering::Relaxed);
                warn!(
                    proxy = %self.name(),
                    high_water = hwm,
                    elapsed = ?elapsed,
                    "write-back overran its tick; lowering high-water mark"
                );

                if self.shutdown.is_triggered() {
                    return;
                }
            }
        }
    }

    /// Requeue the stores a removal of `atom` evicted, ahead of newer entries
    fn restore_evicted(&self, atom: &Handle) {
        let Some(evicted) = self.evicted.lock().remove(&**atom) else {
            return;
        };
        for restored in evicted.into_iter().rev() {
            self.atoms.push_front(restored);
        }
    }

    /// Every atom that a removal of `atom` would extract from the live graph
    fn removal_closure(&self, atom: &Handle, recursive: bool) -> HashSet<Handle> {
        let mut doomed = HashSet::new();
        doomed.insert(Arc::clone(atom));
        if !recursive {
            return doomed;
        }
        let space = self.writer.core().space();
        let mut stack = space.incoming_set(atom);
        while let Some(link) = stack.pop() {
            if doomed.insert(Arc::clone(&link)) {
                stack.extend(space.incoming_set(&link));
            }
        }
        doomed
    }
}

// ============================================================================
// WriteBufferProxy
// ============================================================================

/// Write-back proxy with self-tuning backpressure
///
/// Wraps exactly one delegate. Pending stores are collapsed: an atom (or an
/// atom/key pair) queued several times is written once, with whatever it
/// carries at drain time. A write failure on the worker thread leaves the
/// proxy permanently failed: `connected()` turns false and later writes
/// and barriers return `Failed`, while the unwritten entries stay queued.
pub struct WriteBufferProxy {
    config: WriteBufferConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WriteBufferProxy {
    pub fn new(name: impl Into<String>, space: Arc<AtomSpace>) -> Self {
        Self::with_registry(name, space, Arc::new(Registry::with_defaults()))
    }

    pub fn with_registry(
        name: impl Into<String>,
        space: Arc<AtomSpace>,
        registry: Arc<Registry>,
    ) -> Self {
        let config = WriteBufferConfig::default();
        let timing = Timing {
            decay: config.decay,
            tick: config.tick(),
        };
        Self {
            config,
            shared: Arc::new(Shared {
                writer: PassThruProxy::with_registry(name, space, registry),
                atoms: WriteQueue::new(),
                values: WriteQueue::new(),
                high_water: AtomicUsize::new(HIGH_WATER_MAX),
                timing: RwLock::new(timing),
                atom_inflow: AtomicU64::new(0),
                value_inflow: AtomicU64::new(0),
                averages: Mutex::new(Averages::default()),
                atoms_written: AtomicU64::new(0),
                values_written: AtomicU64::new(0),
                stalls: AtomicU64::new(0),
                flush_lock: Mutex::new(()),
                shutdown: Shutdown::default(),
                failure: Mutex::new(None),
                evicted: Mutex::new(HashMap::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Set the default timing, used when the parameter record has no decay
    pub fn with_config(mut self, config: WriteBufferConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WriteBufferConfig {
        &self.config
    }

    pub fn stats(&self) -> WriteBufferStats {
        let timing = self.shared.timing();
        let averages = self.shared.averages.lock();
        WriteBufferStats {
            decay: timing.decay,
            tick: timing.tick,
            atoms_pending: self.shared.atoms.len(),
            values_pending: self.shared.values.len(),
            high_water: self.shared.high_water.load(Ordering::Relaxed),
            atoms: averages.atoms,
            values: averages.values,
            duty_cycle: averages.duty_cycle,
            atoms_written: self.shared.atoms_written.load(Ordering::Relaxed),
            values_written: self.shared.values_written.load(Ordering::Relaxed),
            stalls: self.shared.stalls.load(Ordering::Relaxed),
            failure: self.shared.failure.lock().clone(),
        }
    }

    fn enqueue<T: Clone + Eq + Hash>(
        &self,
        queue: &WriteQueue<T>,
        item: T,
        inflow: &AtomicU64,
    ) -> Result<()> {
        self.shared.check_failed()?;
        match queue.push(item) {
            Err(Closed) => return Err(StorageError::NotOpen(self.name().to_string())),
            Ok(true) => {
                inflow.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {}
        }

        let pending = queue.len();
        let hwm = self.shared.high_water.load(Ordering::Relaxed);
        if pending > hwm {
            self.shared.stalls.fetch_add(1, Ordering::Relaxed);
            debug!(proxy = %self.name(), pending, high_water = hwm, "throttling producer");
            thread::sleep(self.shared.timing().tick);
        }
        Ok(())
    }
}

impl ProxyType for WriteBufferProxy {
    fn create(name: &str, space: Arc<AtomSpace>, registry: Arc<Registry>) -> Self {
        Self::with_registry(name, space, registry)
    }
}

impl StorageNode for WriteBufferProxy {
    fn name(&self) -> &str {
        self.shared.name()
    }

    fn type_name(&self) -> &'static str {
        "WriteBufferProxy"
    }

    fn open(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let decay = match self.shared.writer.core().decay() {
            Some(seconds) => Duration::from_secs_f64(seconds),
            None => self.config.decay,
        };
        if decay.is_zero() {
            return Err(StorageError::Configuration(format!(
                "{} {}: decay time must be positive",
                self.type_name(),
                self.name()
            )));
        }
        self.shared.writer.open_as(self.type_name())?;

        let config = WriteBufferConfig { decay };
        *self.shared.timing.write() = Timing {
            decay,
            tick: config.tick(),
        };
        *self.shared.averages.lock() = Averages::default();
        *self.shared.failure.lock() = None;
        self.shared.high_water.store(HIGH_WATER_MAX, Ordering::Relaxed);
        self.shared.shutdown.reset();
        self.shared.atoms.reopen();
        self.shared.values.reopen();

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("write-buffer:{}", self.name()))
            .spawn(move || shared.drain_loop());
        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(err) => {
                self.shared.atoms.close();
                self.shared.values.close();
                if let Err(close_err) = self.shared.writer.close() {
                    warn!(proxy = %self.name(), error = %close_err, "failed to close writer");
                }
                return Err(err.into());
            }
        }

        info!(
            proxy = %self.name(),
            decay = ?decay,
            tick = ?config.tick(),
            "write buffer opened"
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.shared.shutdown.trigger();
        self.shared.atoms.close();
        self.shared.values.close();

        let worker = self.worker.lock().take();
        let joined = match worker {
            Some(handle) => handle.join().map_err(|_| {
                StorageError::Failed(format!("write-back thread of {} panicked", self.name()))
            }),
            None => Ok(()),
        };

        let flushed = self.barrier();
        if let Err(err) = &flushed {
            error!(
                proxy = %self.name(),
                error = %err,
                atoms = self.shared.atoms.len(),
                values = self.shared.values.len(),
                "closing with unwritten entries"
            );
        }
        let closed = self.shared.writer.close();

        let stats = self.stats();
        info!(
            proxy = %self.name(),
            atoms_written = stats.atoms_written,
            values_written = stats.values_written,
            stalls = stats.stalls,
            "write buffer closed"
        );
        joined.and(flushed).and(closed)
    }

    fn connected(&self) -> bool {
        self.shared.writer.connected()
            && self.shared.failure.lock().is_none()
            && self
                .worker
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    fn capabilities(&self) -> Capabilities {
        self.shared.writer.capabilities()
    }

    fn monitor(&self) -> String {
        let stats = self.stats();
        let mut report = format!(
            "WriteBufferProxy {}: decay {:.3}s, tick {:.3}s\n",
            self.name(),
            stats.decay.as_secs_f64(),
            stats.tick.as_secs_f64()
        );
        report.push_str(&format!(
            "  atoms:  {} pending, {} written, avg in {:.1} / queued {:.1} / out {:.1}\n",
            stats.atoms_pending,
            stats.atoms_written,
            stats.atoms.inflow,
            stats.atoms.occupancy,
            stats.atoms.outflow
        ));
        report.push_str(&format!(
            "  values: {} pending, {} written, avg in {:.1} / queued {:.1} / out {:.1}\n",
            stats.values_pending,
            stats.values_written,
            stats.values.inflow,
            stats.values.occupancy,
            stats.values.outflow
        ));
        report.push_str(&format!(
            "  high-water mark {}, duty cycle {:.3}, {} producer stalls\n",
            stats.high_water, stats.duty_cycle, stats.stalls
        ));
        if let Some(failure) = stats.failure {
            report.push_str(&format!("  FAILED: {}\n", failure));
        }
        report
    }

    fn set_parameters(&self, parameters: ProxyParameters) -> Result<()> {
        self.shared.writer.set_parameters(parameters)
    }

    fn fetch_atom(&self, atom: &Handle) -> Result<()> {
        self.shared.writer.fetch_atom(atom)
    }

    fn fetch_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.shared.writer.fetch_value(atom, key)
    }

    fn fetch_incoming_set(&self, atom: &Handle) -> Result<()> {
        self.shared.writer.fetch_incoming_set(atom)
    }

    fn fetch_incoming_by_type(&self, atom: &Handle, atom_type: &AtomType) -> Result<()> {
        self.shared.writer.fetch_incoming_by_type(atom, atom_type)
    }

    fn store_atom(&self, atom: &Handle) -> Result<()> {
        self.enqueue(&self.shared.atoms, Arc::clone(atom), &self.shared.atom_inflow)
    }

    fn store_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.enqueue(
            &self.shared.values,
            (Arc::clone(atom), Arc::clone(key)),
            &self.shared.value_inflow,
        )
    }

    fn update_value(&self, atom: &Handle, key: &Handle, delta: &Value) -> Result<()> {
        self.shared.check_failed()?;
        let pair = (Arc::clone(atom), Arc::clone(key));
        {
            let _flush = self.shared.flush_lock.lock();
            if self.shared.values.remove(&pair) {
                if let Err(err) = self.shared.writer.store_value(atom, key) {
                    self.shared.values.push_front(pair);
                    return Err(err);
                }
                self.shared.values_written.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.shared.writer.update_value(atom, key, delta)
    }

    fn fetch_all_of_type(&self, atom_type: &AtomType) -> Result<()> {
        self.shared.writer.fetch_all_of_type(atom_type)
    }

    fn load_whole_graph(&self) -> Result<()> {
        self.shared.writer.load_whole_graph()
    }

    fn store_whole_graph(&self) -> Result<()> {
        self.shared.writer.store_whole_graph()
    }

    fn pre_remove_atom(&self, atom: &Handle, recursive: bool) -> Result<()> {
        {
            let _flush = self.shared.flush_lock.lock();
            // Pending value writes cannot be found per atom without a scan
            if !self.shared.values.is_empty() {
                self.shared.write_values(usize::MAX)?;
            }

            let doomed = self.shared.removal_closure(atom, recursive);
            let evicted = self.shared.atoms.remove_where(|queued| doomed.contains(queued));
            if !evicted.is_empty() {
                debug!(
                    proxy = %self.name(),
                    atom = %atom,
                    evicted = evicted.len(),
                    "evicted pending stores of removed atoms"
                );
                self.shared.evicted.lock().insert(Arc::clone(atom), evicted);
            }
        }
        if let Err(err) = self.shared.writer.pre_remove_atom(atom, recursive) {
            self.shared.restore_evicted(atom);
            return Err(err);
        }
        Ok(())
    }

    fn post_remove_atom(&self, atom: &Handle, recursive: bool, extracted_ok: bool) -> Result<()> {
        if extracted_ok {
            self.shared.evicted.lock().remove(&**atom);
        } else {
            self.shared.restore_evicted(atom);
        }
        self.shared.writer.post_remove_atom(atom, recursive, extracted_ok)
    }

    fn run_query(
        &self,
        query: &Handle,
        key: &Handle,
        metadata: Option<&Handle>,
        fresh: bool,
    ) -> Result<()> {
        self.shared.writer.run_query(query, key, metadata, fresh)
    }

    fn barrier(&self) -> Result<()> {
        self.shared.check_failed()?;
        self.shared.flush()?;
        self.shared.writer.barrier()
    }
}

impl Drop for WriteBufferProxy {
    fn drop(&mut self) {
        self.shared.shutdown.trigger();
        let pending = self.shared.atoms.len() + self.shared.values.len();
        if pending > 0 {
            warn!(proxy = %self.name(), pending, "write buffer dropped without close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingStorage};
    use crate::Capability;
    use atomstore_graph::Atom;

    fn buffered(decay: f64) -> (Arc<AtomSpace>, Arc<RecordingStorage>, WriteBufferProxy) {
        let space = Arc::new(AtomSpace::new());
        let backend = Arc::new(RecordingStorage::new("rec", Arc::clone(&space)));
        let proxy = WriteBufferProxy::new("wb", Arc::clone(&space));
        proxy
            .set_parameters(ProxyParameters::single(backend.clone()).with_decay(decay))
            .unwrap();
        proxy.open().unwrap();
        (space, backend, proxy)
    }

    fn concepts(space: &AtomSpace, n: usize) -> Vec<Handle> {
        (0..n)
            .map(|i| space.add_atom(&Atom::node("ConceptNode", format!("c{}", i))).unwrap())
            .collect()
    }

    #[test]
    fn test_tick_is_quarter_decay_capped() {
        let config = WriteBufferConfig::default();
        assert_eq!(config.decay, Duration::from_secs(30));
        assert_eq!(config.tick(), Duration::from_millis(7500));

        let slow = WriteBufferConfig::new().with_decay(Duration::from_secs(120));
        assert_eq!(slow.tick(), Duration::from_secs(10));
    }

    #[test]
    fn test_stores_are_deferred_until_barrier() {
        let (space, backend, proxy) = buffered(60.0);
        let atoms = concepts(&space, 3);
        for atom in &atoms {
            proxy.store_atom(atom).unwrap();
        }
        assert_eq!(backend.count(|c| matches!(c, Call::StoreAtom(_))), 0);
        assert_eq!(proxy.stats().atoms_pending, 3);

        proxy.barrier().unwrap();
        assert_eq!(backend.stored_atoms(), atoms);
        assert_eq!(proxy.stats().atoms_pending, 0);
        proxy.close().unwrap();
    }

    #[test]
    fn test_duplicate_stores_collapse() {
        let (space, backend, proxy) = buffered(60.0);
        let cat = concepts(&space, 1).remove(0);
        let key = Atom::node("PredicateNode", "k");
        for _ in 0..5 {
            proxy.store_atom(&cat).unwrap();
            proxy.store_value(&cat, &key).unwrap();
        }
        proxy.close().unwrap();

        assert_eq!(backend.count(|c| matches!(c, Call::StoreAtom(_))), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::StoreValue(..))), 1);
    }

    #[test]
    fn test_worker_drains_without_barrier() {
        let (space, backend, proxy) = buffered(0.04);
        let atoms = concepts(&space, 50);
        for atom in &atoms {
            proxy.store_atom(atom).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while backend.stored_atoms().len() < atoms.len() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(backend.stored_atoms().len(), atoms.len());
        assert!(proxy.stats().atoms_written >= 50);
        proxy.close().unwrap();
    }

    #[test]
    fn test_closed_buffer_rejects_stores() {
        let (space, _backend, proxy) = buffered(60.0);
        proxy.close().unwrap();
        let cat = concepts(&space, 1).remove(0);
        assert!(matches!(proxy.store_atom(&cat), Err(StorageError::NotOpen(_))));
        assert!(!proxy.connected());
    }

    #[test]
    fn test_recursive_removal_evicts_pending() {
        let (space, backend, proxy) = buffered(60.0);
        let cat = Atom::node("ConceptNode", "cat");
        let animal = Atom::node("ConceptNode", "animal");
        let inh = Atom::link("InheritanceLink", vec![cat.clone(), animal.clone()]);
        space.add_atom(&inh).unwrap();
        for atom in [&cat, &animal, &inh] {
            proxy.store_atom(atom).unwrap();
        }

        proxy.pre_remove_atom(&cat, true).unwrap();
        assert!(space.extract_atom(&cat, true));
        proxy.post_remove_atom(&cat, true, true).unwrap();
        proxy.close().unwrap();

        assert_eq!(backend.stored_atoms(), vec![animal]);
    }

    #[test]
    fn test_failed_extraction_requeues() {
        let (space, backend, proxy) = buffered(60.0);
        let cat = concepts(&space, 1).remove(0);
        proxy.store_atom(&cat).unwrap();

        proxy.pre_remove_atom(&cat, false).unwrap();
        assert_eq!(proxy.stats().atoms_pending, 0);
        proxy.post_remove_atom(&cat, false, false).unwrap();
        assert_eq!(proxy.stats().atoms_pending, 1);

        proxy.barrier().unwrap();
        assert_eq!(backend.stored_atoms(), vec![cat]);
        proxy.close().unwrap();
    }

    #[test]
    fn test_removal_flushes_value_queue() {
        let (space, backend, proxy) = buffered(60.0);
        let atoms = concepts(&space, 2);
        let key = Atom::node("PredicateNode", "k");
        space.set_value(&atoms[1], &key, Some(Value::floats(vec![1.0]))).unwrap();
        proxy.store_value(&atoms[1], &key).unwrap();

        proxy.pre_remove_atom(&atoms[0], false).unwrap();
        assert_eq!(backend.count(|c| matches!(c, Call::StoreValue(..))), 1);
        proxy.post_remove_atom(&atoms[0], false, true).unwrap();
        proxy.close().unwrap();
    }

    #[test]
    fn test_failed_value_flush_keeps_pending_stores() {
        let (space, backend, proxy) = buffered(60.0);
        let atoms = concepts(&space, 2);
        let (cat, dog) = (&atoms[0], &atoms[1]);
        let key = Atom::node("PredicateNode", "k");
        space.set_value(dog, &key, Some(Value::floats(vec![1.0]))).unwrap();
        proxy.store_atom(cat).unwrap();
        proxy.store_value(dog, &key).unwrap();

        backend.fail_writes(true);
        assert!(proxy.pre_remove_atom(cat, false).is_err());
        assert_eq!(proxy.stats().atoms_pending, 1);
        assert_eq!(proxy.stats().values_pending, 1);
        assert!(proxy.shared.evicted.lock().is_empty());

        backend.fail_writes(false);
        proxy.close().unwrap();
        assert_eq!(backend.stored_atoms(), vec![Arc::clone(cat)]);
        assert_eq!(backend.count(|c| matches!(c, Call::StoreValue(..))), 1);
    }

    #[test]
    fn test_refused_removal_requeues_in_order() {
        let (space, backend, proxy) = buffered(60.0);
        let cat = Atom::node("ConceptNode", "cat");
        let animal = Atom::node("ConceptNode", "animal");
        let inh = Atom::link("InheritanceLink", vec![cat.clone(), animal.clone()]);
        space.add_atom(&inh).unwrap();
        for atom in [&cat, &inh, &animal] {
            proxy.store_atom(atom).unwrap();
        }

        backend.fail_removals(true);
        assert!(proxy.pre_remove_atom(&cat, true).is_err());
        assert!(proxy.shared.evicted.lock().is_empty());
        assert_eq!(proxy.stats().atoms_pending, 3);

        proxy.close().unwrap();
        assert_eq!(backend.stored_atoms(), vec![cat, inh, animal]);
    }

    #[test]
    fn test_update_value_writes_pending_store_first() {
        let (space, backend, proxy) = buffered(60.0);
        let cat = concepts(&space, 1).remove(0);
        let count = Atom::node("PredicateNode", "count");
        space.set_value(&cat, &count, Some(Value::floats(vec![5.0]))).unwrap();

        proxy.store_value(&cat, &count).unwrap();
        proxy.update_value(&cat, &count, &Value::floats(vec![1.0])).unwrap();
        proxy.close().unwrap();

        let writes: Vec<Call> = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::StoreValue(..) | Call::UpdateValue(..)))
            .collect();
        assert_eq!(writes.len(), 2);
        assert!(matches!(writes[0], Call::StoreValue(..)));
        assert_eq!(
            backend.inner().stored_value(&cat, &count),
            Some(Value::floats(vec![6.0]))
        );
    }

    #[test]
    fn test_drain_failure_is_permanent() {
        let (space, backend, proxy) = buffered(0.04);
        backend.fail_writes(true);
        let cat = concepts(&space, 1).remove(0);
        proxy.store_atom(&cat).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while proxy.stats().failure.is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(proxy.stats().failure.is_some());
        assert!(!proxy.connected());
        assert!(matches!(proxy.barrier(), Err(StorageError::Failed(_))));
        assert!(matches!(proxy.store_atom(&cat), Err(StorageError::Failed(_))));
        // The failing entry is kept
        assert_eq!(proxy.stats().atoms_pending, 1);
        assert!(proxy.close().is_err());
    }

    #[test]
    fn test_reopen_after_close() {
        let (space, backend, proxy) = buffered(60.0);
        proxy.close().unwrap();
        proxy.open().unwrap();
        assert!(proxy.connected());

        let cat = concepts(&space, 1).remove(0);
        proxy.store_atom(&cat).unwrap();
        proxy.close().unwrap();
        assert_eq!(backend.stored_atoms(), vec![cat]);
    }

    #[test]
    fn test_monitor_reports_queues() {
        let (space, _backend, proxy) = buffered(60.0);
        proxy.store_atom(&concepts(&space, 1)[0]).unwrap();
        let report = proxy.monitor();
        assert!(report.contains("WriteBufferProxy wb"));
        assert!(report.contains("1 pending"));
        assert!(report.contains("high-water mark 1000000000"));
        proxy.close().unwrap();
    }

    #[test]
    fn test_capabilities_follow_writer() {
        let (_space, _backend, proxy) = buffered(60.0);
        assert!(proxy.capabilities().supports(Capability::StoreAtom));
        assert!(!proxy.capabilities().supports(Capability::RunQuery));

        proxy.close().unwrap();
        assert_eq!(proxy.capabilities(), Capabilities::all());
    }
}
