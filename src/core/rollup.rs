//! Nesting levels of a rollup over the group-by fields.
//!
//! Level `d` is open while consecutive group keys agree on the group fields
//! `0..=d`. Only levels `min_depth..=max_depth` are tracked: the fields below
//! `min_depth` are partition fields, constant within a partition.

use crate::core::{serialization_info::RollupDepths, tuple::TupleRead};
use std::{iter::Rev, ops::RangeInclusive};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RollupEvent {
    Open(usize),
    Close(usize),
}

/// Levels to close (deepest first) and then open when the group key changes.
#[derive(Clone, Debug)]
pub struct Transition {
    pub close: Rev<RangeInclusive<usize>>,
    pub open: RangeInclusive<usize>,
}

impl Transition {
    pub fn events(self) -> impl Iterator<Item = RollupEvent> {
        self.close
            .map(RollupEvent::Close)
            .chain(self.open.map(RollupEvent::Open))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Rollup {
    min_depth: usize,
    max_depth: usize,
}

impl Rollup {
    pub fn new(depths: RollupDepths) -> Self {
        Self {
            min_depth: depths.min_depth,
            max_depth: depths.max_depth,
        }
    }

    pub fn min_depth(&self) -> usize {
        self.min_depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Levels opened by the first key of a partition.
    pub fn begin(&self) -> RangeInclusive<usize> {
        self.min_depth..=self.max_depth
    }

    /// Levels closed after the last key of a partition.
    pub fn finish(&self) -> Rev<RangeInclusive<usize>> {
        (self.min_depth..=self.max_depth).rev()
    }

    /// Shallowest level whose key changes, clamped up to `min_depth`;
    /// `None` when the keys agree on every tracked field.
    ///
    /// The scan starts at depth 0, not `min_depth`: a partition may hold
    /// several partition prefixes, and a change above `min_depth` must
    /// still close and reopen every tracked level.
    pub fn mismatch<L, R>(&self, previous: &L, next: &R) -> Option<usize>
    where
        L: TupleRead + ?Sized,
        R: TupleRead + ?Sized,
    {
        (0..=self.max_depth)
            .find(|&depth| previous.get(depth) != next.get(depth))
            .map(|depth| depth.max(self.min_depth))
    }

    pub fn transition<L, R>(&self, previous: &L, next: &R) -> Option<Transition>
    where
        L: TupleRead + ?Sized,
        R: TupleRead + ?Sized,
    {
        self.mismatch(previous, next).map(|depth| Transition {
            close: (depth..=self.max_depth).rev(),
            open: depth..=self.max_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{schema::Schema, tuple::Tuple};
    use std::sync::Arc;

    fn key(schema: &Arc<Schema>, values: [&str; 3]) -> Tuple {
        let mut tuple = Tuple::new(schema.clone());
        for (i, value) in values.into_iter().enumerate() {
            tuple.set(i, value).expect("set key field");
        }
        tuple
    }

    #[test]
    fn test_four_keys_at_depth_three() {
        let schema = Arc::new(Schema::parse("group", "a:string,b:string,c:string").expect("schema"));
        let rollup = Rollup::new(RollupDepths {
            min_depth: 0,
            max_depth: 2,
        });
        let keys = [
            key(&schema, ["x", "y", "1"]),
            key(&schema, ["x", "y", "2"]),
            key(&schema, ["z", "y", "2"]),
            key(&schema, ["z", "y", "3"]),
        ];

        let mut events: Vec<RollupEvent> = rollup.begin().map(RollupEvent::Open).collect();
        for pair in keys.windows(2) {
            let transition = rollup
                .transition(&pair[0], &pair[1])
                .expect("consecutive keys differ");
            events.extend(transition.events());
        }
        events.extend(rollup.finish().map(RollupEvent::Close));

        use RollupEvent::{Close, Open};
        assert_eq!(
            events,
            vec![
                Open(0),
                Open(1),
                Open(2),
                Close(2),
                Open(2),
                Close(2),
                Close(1),
                Close(0),
                Open(0),
                Open(1),
                Open(2),
                Close(2),
                Open(2),
                Close(2),
                Close(1),
                Close(0),
            ]
        );
    }

    #[test]
    fn test_mismatch_is_clamped_to_min_depth() {
        let schema = Arc::new(Schema::parse("group", "a:string,b:string,c:string").expect("schema"));
        let rollup = Rollup::new(RollupDepths {
            min_depth: 1,
            max_depth: 2,
        });
        let first = key(&schema, ["x", "y", "1"]);
        assert_eq!(rollup.mismatch(&first, &key(&schema, ["w", "y", "1"])), Some(1));
        assert_eq!(rollup.mismatch(&first, &key(&schema, ["x", "y", "2"])), Some(2));
        assert_eq!(rollup.mismatch(&first, &first.clone()), None);
        assert!(rollup.transition(&first, &first).is_none());
    }
}
