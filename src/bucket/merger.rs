//! Map merger (spec.md §4.4): folds N sorted iterators into their sorted
//! union. Used by the bucket layer to present an object's whole bucket
//! chain as one stream, and by compaction to fold overlapping buckets.

use super::iterator::MapIterator;

/// Merges a set of sorted sources. Sources are listed newest-first: when
/// `skip_equals` is set and two sources share a key, the earlier
/// (newest) source wins and the rest are advanced past it, matching
/// "later sources overridden by earlier" in spec.md §4.4.
pub struct Merger<'a> {
    sources: Vec<Box<dyn MapIterator + 'a>>,
    skip_equals: bool,
}

impl<'a> Merger<'a> {
    pub fn new(sources: Vec<Box<dyn MapIterator + 'a>>, skip_equals: bool) -> Self {
        Merger { sources, skip_equals }
    }

    /// Picks the smallest current key among live sources, returns it and
    /// its value, and advances the winner (and any equal-keyed losers
    /// when `skip_equals`). Detaches sources whose current is `None`.
    pub fn next(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        self.sources.retain(|s| s.current().is_some());
        if self.sources.is_empty() {
            return None;
        }

        let mut winner = 0;
        for i in 1..self.sources.len() {
            let (wk, _) = self.sources[winner].current().unwrap();
            let (ck, _) = self.sources[i].current().unwrap();
            if ck < wk {
                winner = i;
            }
        }

        let (key, value) = {
            let (k, v) = self.sources[winner].current().unwrap();
            (k.to_vec(), v.to_vec())
        };

        if self.skip_equals {
            for (i, s) in self.sources.iter_mut().enumerate() {
                if i == winner {
                    continue;
                }
                if let Some((k, _)) = s.current() {
                    if k == key.as_slice() {
                        s.advance();
                    }
                }
            }
        }
        self.sources[winner].advance();
        Some((key, value))
    }

    pub fn collect_all(mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        while let Some(kv) = self.next() {
            out.push(kv);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::iterator::VecMap;

    fn vm(pairs: &[(&str, &str)]) -> VecMap {
        VecMap::from_sorted(
            pairs
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
                .collect(),
        )
    }

    #[test]
    fn merges_disjoint_sources_in_order() {
        let a = vm(&[("a", "1"), ("c", "3")]);
        let b = vm(&[("b", "2"), ("d", "4")]);
        let merger = Merger::new(vec![Box::new(a), Box::new(b)], true);
        let out = merger.collect_all();
        let keys: Vec<_> = out.iter().map(|(k, _)| String::from_utf8(k.clone()).unwrap()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn newer_source_overrides_on_duplicate_keys() {
        // `a` is listed first (newest); its value for "b" must win.
        let a = vm(&[("b", "new")]);
        let b = vm(&[("b", "old"), ("c", "3")]);
        let merger = Merger::new(vec![Box::new(a), Box::new(b)], true);
        let out = merger.collect_all();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], (b"b".to_vec(), b"new".to_vec()));
        assert_eq!(out[1], (b"c".to_vec(), b"3".to_vec()));
    }

    #[test]
    fn without_skip_equals_duplicates_pass_through() {
        let a = vm(&[("b", "1")]);
        let b = vm(&[("b", "2")]);
        let merger = Merger::new(vec![Box::new(a), Box::new(b)], false);
        let out = merger.collect_all();
        assert_eq!(out.len(), 2);
    }
}
