//! Interrupt aggregation for the CPU's IRQ and NMI inputs.
//!
//! The 6502 has one IRQ line shared among all devices and one NMI line. This
//! module keeps track of *who* is holding each line so that the line only
//! drops once every holder has let go.
//!
//! # Line Model
//!
//! - **Named holders**: Every assertion is tagged with an [`InterruptSource`];
//!   asserting twice from the same source is the same as asserting once
//! - **Edge on first holder**: The CPU is notified only when a line goes from
//!   no holders to one holder
//! - **Release on last holder**: The line reads as pending until the last
//!   holder clears
//! - **Peripheral reconciliation**: Once per bus step the holders tagged
//!   [`InterruptSource::Peripheral`] are synchronised with the set of
//!   peripherals currently asserting their interrupt output, leaving debug
//!   and other manual holders alone
//!
//! # Example
//!
//! ```rust
//! use homebrew6502::{InterruptController, InterruptSource};
//!
//! let mut interrupts = InterruptController::new();
//!
//! assert!(interrupts.trigger_irq(InterruptSource::peripheral("acia")));
//! assert!(!interrupts.trigger_irq(InterruptSource::Debug)); // line already held
//!
//! interrupts.clear_irq(&InterruptSource::peripheral("acia"));
//! assert!(interrupts.is_irq_pending());
//!
//! interrupts.clear_irq(&InterruptSource::Debug);
//! assert!(!interrupts.is_irq_pending());
//! ```

use std::collections::BTreeSet;
use std::fmt;

/// Who is holding an interrupt line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InterruptSource {
    /// A peripheral registered on the bus, by registration name.
    Peripheral(String),
    /// Manual trigger from a debugger or test harness.
    Debug,
    /// Anything else, by tag.
    Other(String),
}

impl InterruptSource {
    /// Tag for the peripheral registered as `name`.
    pub fn peripheral(name: impl Into<String>) -> Self {
        InterruptSource::Peripheral(name.into())
    }

    /// Whether this holder is managed by peripheral reconciliation.
    pub fn is_peripheral(&self) -> bool {
        matches!(self, InterruptSource::Peripheral(_))
    }
}

impl fmt::Display for InterruptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptSource::Peripheral(name) => write!(f, "peripheral:{}", name),
            InterruptSource::Debug => write!(f, "debug"),
            InterruptSource::Other(tag) => write!(f, "other:{}", tag),
        }
    }
}

/// How a line moved as the result of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    /// Holders changed, or nothing did, but the line level is the same.
    Unchanged,
    /// The line went from idle to asserted.
    Raised,
    /// The last holder let go.
    Released,
}

type EdgeCallback = Box<dyn FnMut()>;

/// Aggregates named interrupt holders into IRQ and NMI line levels.
#[derive(Default)]
pub struct InterruptController {
    irq_sources: BTreeSet<InterruptSource>,
    nmi_sources: BTreeSet<InterruptSource>,
    on_irq: Option<EdgeCallback>,
    on_nmi: Option<EdgeCallback>,
}

impl InterruptController {
    /// Create a controller with both lines idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` every time the IRQ line is raised.
    pub fn set_irq_callback<F>(&mut self, callback: F)
    where
        F: FnMut() + 'static,
    {
        self.on_irq = Some(Box::new(callback));
    }

    /// Call `callback` every time the NMI line is raised.
    pub fn set_nmi_callback<F>(&mut self, callback: F)
    where
        F: FnMut() + 'static,
    {
        self.on_nmi = Some(Box::new(callback));
    }

    /// Add `source` as an IRQ holder.
    ///
    /// Returns true if this raised the line.
    pub fn trigger_irq(&mut self, source: InterruptSource) -> bool {
        let was_idle = self.irq_sources.is_empty();
        log::trace!("IRQ asserted by {}", source);
        self.irq_sources.insert(source);
        if was_idle {
            self.fire_irq();
        }
        was_idle
    }

    /// Add `source` as an NMI holder.
    ///
    /// Returns true if this raised the line.
    pub fn trigger_nmi(&mut self, source: InterruptSource) -> bool {
        let was_idle = self.nmi_sources.is_empty();
        log::trace!("NMI asserted by {}", source);
        self.nmi_sources.insert(source);
        if was_idle {
            if let Some(callback) = self.on_nmi.as_mut() {
                callback();
            }
        }
        was_idle
    }

    /// Remove `source` from the IRQ holders.
    ///
    /// Returns true if this released the line.
    pub fn clear_irq(&mut self, source: &InterruptSource) -> bool {
        self.irq_sources.remove(source) && self.irq_sources.is_empty()
    }

    /// Remove `source` from the NMI holders.
    ///
    /// Returns true if this released the line.
    pub fn clear_nmi(&mut self, source: &InterruptSource) -> bool {
        self.nmi_sources.remove(source) && self.nmi_sources.is_empty()
    }

    /// Whether any source holds IRQ.
    pub fn is_irq_pending(&self) -> bool {
        !self.irq_sources.is_empty()
    }

    /// Whether any source holds NMI.
    pub fn is_nmi_pending(&self) -> bool {
        !self.nmi_sources.is_empty()
    }

    /// Current IRQ holders.
    pub fn irq_sources(&self) -> impl Iterator<Item = &InterruptSource> {
        self.irq_sources.iter()
    }

    /// Current NMI holders.
    pub fn nmi_sources(&self) -> impl Iterator<Item = &InterruptSource> {
        self.nmi_sources.iter()
    }

    /// Synchronise peripheral IRQ holders with the peripherals now asserting.
    ///
    /// Peripherals in `active` that are not yet holders are added; peripheral
    /// holders missing from `active` are removed. Non-peripheral holders are
    /// untouched.
    pub fn update_from_peripherals<'a, I>(&mut self, active: I) -> LineChange
    where
        I: IntoIterator<Item = &'a str>,
    {
        let was_idle = self.irq_sources.is_empty();
        let active: BTreeSet<InterruptSource> =
            active.into_iter().map(InterruptSource::peripheral).collect();

        self.irq_sources
            .retain(|source| !source.is_peripheral() || active.contains(source));
        self.irq_sources.extend(active);

        match (was_idle, self.irq_sources.is_empty()) {
            (true, false) => {
                log::trace!("IRQ raised by peripherals");
                self.fire_irq();
                LineChange::Raised
            }
            (false, true) => LineChange::Released,
            _ => LineChange::Unchanged,
        }
    }

    /// Drop every holder on both lines.
    pub fn reset(&mut self) {
        self.irq_sources.clear();
        self.nmi_sources.clear();
    }

    fn fire_irq(&mut self) {
        if let Some(callback) = self.on_irq.as_mut() {
            callback();
        }
    }
}

impl fmt::Debug for InterruptController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptController")
            .field("irq_sources", &self.irq_sources)
            .field("nmi_sources", &self.nmi_sources)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counting_controller() -> (InterruptController, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let irq_edges = Rc::new(Cell::new(0));
        let nmi_edges = Rc::new(Cell::new(0));
        let mut controller = InterruptController::new();
        let irq = Rc::clone(&irq_edges);
        controller.set_irq_callback(move || irq.set(irq.get() + 1));
        let nmi = Rc::clone(&nmi_edges);
        controller.set_nmi_callback(move || nmi.set(nmi.get() + 1));
        (controller, irq_edges, nmi_edges)
    }

    fn other(tag: &str) -> InterruptSource {
        InterruptSource::Other(tag.to_string())
    }

    #[test]
    fn test_edge_fires_once_for_overlapping_triggers() {
        let (mut controller, irq_edges, _) = counting_controller();

        controller.trigger_irq(other("a"));
        controller.trigger_irq(other("b"));
        controller.trigger_irq(other("a"));
        assert_eq!(irq_edges.get(), 1);

        assert!(!controller.clear_irq(&other("a")));
        assert!(controller.is_irq_pending());
        assert!(controller.clear_irq(&other("b")));
        assert!(!controller.is_irq_pending());

        // A fresh assertion is a new edge
        controller.trigger_irq(other("a"));
        assert_eq!(irq_edges.get(), 2);
    }

    #[test]
    fn test_nmi_tracked_independently() {
        let (mut controller, irq_edges, nmi_edges) = counting_controller();

        assert!(controller.trigger_nmi(InterruptSource::Debug));
        assert!(!controller.trigger_nmi(InterruptSource::Debug));
        assert_eq!(nmi_edges.get(), 1);
        assert_eq!(irq_edges.get(), 0);
        assert!(!controller.is_irq_pending());

        assert!(controller.clear_nmi(&InterruptSource::Debug));
        assert!(!controller.is_nmi_pending());
    }

    #[test]
    fn test_clearing_absent_source_is_noop() {
        let mut controller = InterruptController::new();
        assert!(!controller.clear_irq(&InterruptSource::Debug));
        controller.trigger_irq(InterruptSource::Debug);
        assert!(!controller.clear_irq(&other("missing")));
        assert!(controller.is_irq_pending());
    }

    #[test]
    fn test_update_from_peripherals_reconciles() {
        let (mut controller, irq_edges, _) = counting_controller();

        assert_eq!(
            controller.update_from_peripherals(["acia", "via"]),
            LineChange::Raised
        );
        assert_eq!(controller.irq_sources().count(), 2);

        assert_eq!(
            controller.update_from_peripherals(["via"]),
            LineChange::Unchanged
        );
        assert_eq!(
            controller.irq_sources().collect::<Vec<_>>(),
            vec![&InterruptSource::peripheral("via")]
        );

        assert_eq!(
            controller.update_from_peripherals(std::iter::empty()),
            LineChange::Released
        );
        assert_eq!(irq_edges.get(), 1);
    }

    #[test]
    fn test_update_leaves_manual_sources_alone() {
        let (mut controller, irq_edges, _) = counting_controller();
        controller.trigger_irq(InterruptSource::Debug);

        assert_eq!(
            controller.update_from_peripherals(["acia"]),
            LineChange::Unchanged
        );
        assert_eq!(
            controller.update_from_peripherals(std::iter::empty()),
            LineChange::Unchanged
        );
        assert!(controller.is_irq_pending());
        assert_eq!(irq_edges.get(), 1);
    }

    #[test]
    fn test_reset_clears_both_lines() {
        let mut controller = InterruptController::new();
        controller.trigger_irq(InterruptSource::peripheral("via"));
        controller.trigger_nmi(InterruptSource::Debug);

        controller.reset();

        assert!(!controller.is_irq_pending());
        assert!(!controller.is_nmi_pending());
    }

    #[test]
    fn test_source_display() {
        assert_eq!(
            InterruptSource::peripheral("acia").to_string(),
            "peripheral:acia"
        );
        assert_eq!(InterruptSource::Debug.to_string(), "debug");
        assert!(!other("x").is_peripheral());
    }
}
