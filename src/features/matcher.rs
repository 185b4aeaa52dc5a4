use super::orb::Descriptor;

/// A correspondence between a query descriptor and a train descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: u32,
}

/// Brute-force Hamming matching with cross-check: a pair is kept only when
/// each descriptor is the other's nearest neighbour. Ties resolve to the
/// lowest index. Output is sorted by ascending distance, then query index.
pub fn match_cross_check(query: &[Descriptor], train: &[Descriptor]) -> Vec<DescriptorMatch> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let nearest = |d: &Descriptor, pool: &[Descriptor]| -> (usize, u32) {
        let mut best = (0usize, u32::MAX);
        for (i, candidate) in pool.iter().enumerate() {
            let dist = d.hamming(candidate);
            if dist < best.1 {
                best = (i, dist);
            }
        }
        best
    };

    let train_to_query: Vec<usize> = train.iter().map(|t| nearest(t, query).0).collect();

    let mut matches: Vec<DescriptorMatch> = query
        .iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            let (ti, distance) = nearest(q, train);
            (train_to_query[ti] == qi).then_some(DescriptorMatch {
                query_idx: qi,
                train_idx: ti,
                distance,
            })
        })
        .collect();

    matches.sort_by_key(|m| (m.distance, m.query_idx));
    matches
}
