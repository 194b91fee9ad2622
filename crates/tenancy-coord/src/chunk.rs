//! Disjoint, order-preserving partitioning of tenants into worker chunks.

use crate::tenant::Tenant;

/// One worker's share of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantChunk {
    pub index: usize,
    pub tenants: Vec<Tenant>,
}

impl TenantChunk {
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

/// Split `items` into exactly `parts` contiguous blocks whose sizes differ by
/// at most one. The first `len % parts` blocks carry the extra item. `parts`
/// of zero is treated as one.
pub fn split_contiguous<T>(items: &[T], parts: usize) -> Vec<&[T]> {
    let parts = parts.max(1);
    let base = items.len() / parts;
    let extra = items.len() % parts;

    let mut blocks = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        blocks.push(&items[start..start + size]);
        start += size;
    }
    blocks
}

/// Partition tenants into `workers` chunks, preserving relative order.
pub fn partition(tenants: &[Tenant], workers: usize) -> Vec<TenantChunk> {
    split_contiguous(tenants, workers)
        .into_iter()
        .enumerate()
        .map(|(index, block)| TenantChunk {
            index,
            tenants: block.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tenants(n: usize) -> Vec<Tenant> {
        (0..n).map(|i| Tenant::new(format!("t{i}").as_str())).collect()
    }

    #[test]
    fn even_split() {
        let chunks = partition(&tenants(6), 3);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 2));
        assert_eq!(chunks[1].tenants[0].key.as_str(), "t2");
    }

    #[test]
    fn uneven_split_front_loaded() {
        let sizes: Vec<usize> = partition(&tenants(7), 3).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![3, 2, 2]);
    }

    #[test]
    fn more_workers_than_tenants() {
        let chunks = partition(&tenants(2), 4);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.iter().filter(|c| !c.is_empty()).count(), 2);
    }

    #[test]
    fn zero_workers_is_one() {
        let chunks = partition(&tenants(3), 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 3);
    }

    #[test]
    fn empty_input() {
        let chunks = partition(&[], 3);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(TenantChunk::is_empty));
    }

    proptest! {
        #[test]
        fn partition_law(n in 0usize..200, w in 1usize..32) {
            let items: Vec<usize> = (0..n).collect();
            let blocks = split_contiguous(&items, w);

            prop_assert_eq!(blocks.len(), w);
            let sizes: Vec<usize> = blocks.iter().map(|b| b.len()).collect();
            let max = sizes.iter().copied().max().unwrap_or(0);
            let min = sizes.iter().copied().min().unwrap_or(0);
            prop_assert!(max - min <= 1);

            // Concatenation reproduces the input exactly once each, in order.
            let joined: Vec<usize> = blocks.concat();
            prop_assert_eq!(joined, items);
        }
    }
}
