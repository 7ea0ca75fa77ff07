/// Number of categories tracked by [`CycleProfile`].
const CYCLE_CATEGORY_COUNT: usize = 6;

/// Instruction families used to break down executed cycles.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum CycleCategory {
    /// Cell writes and copies (`SET`, `MOV`, `TIME`).
    Memory = 0,
    /// Integer arithmetic.
    Arithmetic = 1,
    /// Conditional and unconditional jumps.
    Branch = 2,
    /// Subroutine calls and returns.
    Call = 3,
    /// Console input and output.
    Io = 4,
    /// Program termination.
    Control = 5,
}

impl CycleCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CycleCategory::Memory => "Memory",
            CycleCategory::Arithmetic => "Arithmetic",
            CycleCategory::Branch => "Branch",
            CycleCategory::Call => "Call",
            CycleCategory::Io => "Console I/O",
            CycleCategory::Control => "Control",
        }
    }

    /// All categories in discriminant order.
    pub const ALL: [CycleCategory; CYCLE_CATEGORY_COUNT] = [
        CycleCategory::Memory,
        CycleCategory::Arithmetic,
        CycleCategory::Branch,
        CycleCategory::Call,
        CycleCategory::Io,
        CycleCategory::Control,
    ];
}

/// Executed-instruction counts per [`CycleCategory`].
///
/// Backed by a flat array indexed by the category discriminant.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CycleProfile {
    counts: [u64; CYCLE_CATEGORY_COUNT],
}

impl CycleProfile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn add(&mut self, category: CycleCategory, amount: u64) {
        let slot = &mut self.counts[category as usize];
        *slot = slot.saturating_add(amount);
    }

    pub fn get(&self, category: CycleCategory) -> u64 {
        self.counts[category as usize]
    }

    /// Returns the total across all categories.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Returns an iterator over all categories and their counts.
    pub fn iter(&self) -> impl Iterator<Item = (CycleCategory, u64)> {
        CycleCategory::ALL.into_iter().zip(self.counts)
    }
}
