use crate::TOTAL_DEPTH;

/// Role of an entropy-context snapshot within one depth's slot row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRole {
    /// State at node entry; every candidate evaluation starts from it.
    CurrBest = 0,
    /// State after the winning alternative at this depth.
    NextBest = 1,
    /// State after the four children of a split tentative.
    TempBest = 2,
}

/// Depth × role matrix of entropy-coder snapshots.
///
/// Snapshots are cheap value-typed copies provided by the entropy service.
#[derive(Debug, Clone)]
pub(crate) struct ContextMatrix<S> {
    slots: Vec<[S; 3]>,
}

impl<S: Clone + Default> ContextMatrix<S> {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..TOTAL_DEPTH)
                .map(|_| [S::default(), S::default(), S::default()])
                .collect(),
        }
    }

    pub(crate) fn get(&self, depth: usize, role: ContextRole) -> &S {
        &self.slots[depth][role as usize]
    }

    pub(crate) fn store(&mut self, depth: usize, role: ContextRole, state: S) {
        self.slots[depth][role as usize] = state;
    }

    pub(crate) fn copy(
        &mut self,
        from: (usize, ContextRole),
        to: (usize, ContextRole),
    ) {
        let state = self.slots[from.0][from.1 as usize].clone();
        self.store(to.0, to.1, state);
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_copy() {
        let mut matrix: ContextMatrix<u64> = ContextMatrix::new();
        matrix.store(0, ContextRole::CurrBest, 41);
        matrix.copy((0, ContextRole::CurrBest), (1, ContextRole::NextBest));
        assert_eq!(*matrix.get(1, ContextRole::NextBest), 41);
        assert_eq!(*matrix.get(1, ContextRole::CurrBest), 0);
    }
}
