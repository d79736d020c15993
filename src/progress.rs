//! Progress reporting
//!
//! The pipeline creates one tracker per source, sized to that source's block
//! range, and advances it as chunks complete. Heap usage rides along with every
//! update. It is only displayed, never used to throttle.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

/// Metadata attached to every progress update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressMeta {
    pub heap_used_mb: f64,
}

/// Receives progress for one source
pub trait ProgressObserver: Send + Sync {
    /// `blocks` completed since the last call, may be zero for metadata only updates
    fn advance(&self, blocks: u64, meta: ProgressMeta);

    /// The source is done, successfully or not
    fn finish(&self) {}
}

/// Hands out one observer per source
pub trait ProgressReporter: Send + Sync {
    fn tracker(&self, label: &str, total_blocks: u64) -> Arc<dyn ProgressObserver>;
}

/// Resident memory of this process
pub struct MemoryProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Megabytes in use, zero when the process cannot be inspected
    pub fn heap_used_mb(&self) -> f64 {
        let Some(pid) = self.pid else {
            return 0.0;
        };
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system
            .process(pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }

    pub fn meta(&self) -> ProgressMeta {
        ProgressMeta {
            heap_used_mb: self.heap_used_mb(),
        }
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal progress bars, one line per source
pub struct BarReporter {
    multi: MultiProgress,
    memory_threshold_mb: Option<f64>,
    threshold_warned: Arc<AtomicBool>,
}

impl BarReporter {
    pub fn new(memory_threshold: Option<u64>) -> Self {
        Self {
            multi: MultiProgress::new(),
            memory_threshold_mb: memory_threshold.map(|b| b as f64 / (1024.0 * 1024.0)),
            threshold_warned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ProgressReporter for BarReporter {
    fn tracker(&self, label: &str, total_blocks: u64) -> Arc<dyn ProgressObserver> {
        Arc::new(self.source_bar(label, total_blocks))
    }
}

impl BarReporter {
    fn source_bar(&self, label: &str, total_blocks: u64) -> SourceBar {
        SourceBar {
            bar: self.multi.add(create_progress_bar(total_blocks, label)),
            memory_threshold_mb: self.memory_threshold_mb,
            threshold_warned: self.threshold_warned.clone(),
        }
    }
}

struct SourceBar {
    bar: ProgressBar,
    memory_threshold_mb: Option<f64>,
    threshold_warned: Arc<AtomicBool>,
}

impl SourceBar {
    // Logs the first crossing of the threshold across all bars of a reporter.
    // True when this update logged it
    fn warn_above_threshold(&self, meta: ProgressMeta) -> bool {
        let Some(threshold) = self.memory_threshold_mb else {
            return false;
        };
        if meta.heap_used_mb <= threshold || self.threshold_warned.swap(true, Ordering::Relaxed) {
            return false;
        }
        warn!(
            heap_used_mb = meta.heap_used_mb,
            threshold_mb = threshold,
            "Memory usage is above the configured threshold"
        );
        true
    }
}

impl ProgressObserver for SourceBar {
    fn advance(&self, blocks: u64, meta: ProgressMeta) {
        self.warn_above_threshold(meta);
        let message = match self.memory_threshold_mb {
            Some(threshold) => {
                format!("Heap used: {:.2} MB / {:.2} MB", meta.heap_used_mb, threshold)
            }
            None => format!("Heap used: {:.2} MB", meta.heap_used_mb),
        };
        self.bar.set_message(message);
        self.bar.inc(blocks);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

/// Creates a progress bar for visual feedback during extraction
pub fn create_progress_bar(total_blocks: u64, info: &str) -> ProgressBar {
    let pb = ProgressBar::new(total_blocks);
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "{{elapsed_precise}} {} {{bar:40.cyan/blue}} {{percent}}% | ETA: {{eta}} | {{pos}}/{{len}} Blocks | {{msg}}",
            info
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.tick();
    pb
}

/// Discards all progress, for tests and non interactive runs
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

struct SilentTracker;

impl ProgressObserver for SilentTracker {
    fn advance(&self, _blocks: u64, _meta: ProgressMeta) {}
}

impl ProgressReporter for SilentReporter {
    fn tracker(&self, _label: &str, _total_blocks: u64) -> Arc<dyn ProgressObserver> {
        Arc::new(SilentTracker)
    }
}
