use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::cluster::projection::ProjectedPartitions;
use crate::cluster::vectorize::euclidean;
use crate::data::pose::{is_undefined_dist, Pose, UNDEFINED_DIST};

/// Ephemeral priority queue record of the ordering expansion.
///
/// The ordering is a strict total order: reachability ascending, ties
/// broken by ascending point id. Two entries compare equal only when
/// both fields do.
#[derive(Copy, Clone, Debug)]
pub struct OrderingEntry {
    pub point: usize,
    pub predecessor: usize,
    pub reachability: f32,
}

impl PartialEq for OrderingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderingEntry {}

impl PartialOrd for OrderingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(self.reachability)
            .cmp(&OrderedFloat(other.reachability))
            .then(self.point.cmp(&other.point))
    }
}

/// OPTICS-style expansion over the approximate neighbor graph.
///
/// Returns the processing permutation of `0..n` and the final
/// reachability of every point, and mirrors both into the poses
/// (`processed`, `reachability`). Every unprocessed point seeds a new
/// expansion, so disconnected neighbor graphs are still fully covered.
pub fn cluster_ordering(
    poses: &mut [Pose],
    partitions: &ProjectedPartitions,
) -> (Vec<usize>, Vec<f32>) {
    let n = poses.len();
    let mut order = Vec::with_capacity(n);
    let mut reach = vec![UNDEFINED_DIST; n];
    let mut queue: BinaryHeap<Reverse<OrderingEntry>> = BinaryHeap::new();

    for seed in 0..n {
        if poses[seed].processed {
            continue;
        }
        queue.push(Reverse(OrderingEntry {
            point: seed,
            predecessor: seed,
            reachability: f32::INFINITY,
        }));

        while let Some(Reverse(current)) = queue.pop() {
            let cur = current.point;
            if poses[cur].processed {
                continue;
            }
            order.push(cur);
            poses[cur].processed = true;

            let core_dist = partitions.inverse_densities[cur];
            for &neigh in &partitions.neighbors[cur] {
                if poses[neigh].processed {
                    continue;
                }
                // sentinel core distances lose against any real distance
                let dist = euclidean(&poses[neigh].features, &poses[cur].features);
                let candidate = core_dist.max(dist);

                if is_undefined_dist(reach[neigh]) || candidate < reach[neigh] {
                    reach[neigh] = candidate;
                    queue.push(Reverse(OrderingEntry {
                        point: neigh,
                        predecessor: cur,
                        reachability: candidate,
                    }));
                }
            }
        }
    }

    for (i, &r) in reach.iter().enumerate() {
        poses[i].reachability = r;
    }
    debug!("ordered {} poses", order.len());
    (order, reach)
}
