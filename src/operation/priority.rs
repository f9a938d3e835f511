/// Scheduling priority, lowest first.
///
/// Ordering is total: `Critical > ForExplicitBondingAndConnecting >
/// ForPriorityReadsWrites > ForNormalReadsWrites > Medium > Low`.
/// Reads and writes issued by a running authentication or initialization
/// transaction use [`Priority::ForPriorityReadsWrites`] so they overtake
/// application traffic already in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Background polling.
    Low,
    /// Library-internal lifecycle work (reconnect attempts, service discovery).
    Medium,
    ForNormalReadsWrites,
    ForPriorityReadsWrites,
    ForExplicitBondingAndConnecting,
    /// User-requested disconnects.
    Critical,
}

impl Priority {
    pub fn as_label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::ForNormalReadsWrites => "normal_rw",
            Priority::ForPriorityReadsWrites => "priority_rw",
            Priority::ForExplicitBondingAndConnecting => "explicit_bond_connect",
            Priority::Critical => "critical",
        }
    }
}
