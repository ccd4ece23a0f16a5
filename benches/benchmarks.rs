use std::collections::VecDeque;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::{criterion_group, criterion_main};
use rand::prelude::*;

use phylonode::tree::{Node, NodeId, Tree};

/// Random binary tree with uniform branch lengths, grown by splitting
/// leaves taken from either end of a queue
fn random_tree(n_leaves: usize) -> Tree {
    let mut tree = Tree::new();
    let mut rng = thread_rng();

    let mut next_deq = VecDeque::new();
    next_deq.push_back(tree.add(Node::new()));

    for _ in 0..(n_leaves - 1) {
        let parent_id = if rng.gen_bool(0.5) {
            next_deq.pop_front()
        } else {
            next_deq.pop_back()
        }
        .unwrap();
        for _ in 0..2 {
            let child = Node::new().with_dist(rng.gen()).unwrap();
            next_deq.push_back(tree.add_child(child, parent_id).unwrap());
        }
    }

    for (i, id) in next_deq.iter().enumerate() {
        tree.get_mut(id).unwrap().set_name(format!("Tip_{i}"));
    }

    tree
}

fn distance_matrix(tree: &Tree, root: &NodeId) {
    let _matrix = tree.node_distance_matrix(root, false).unwrap();
}

fn distance_pairwise(tree: &Tree, root: &NodeId) {
    let nodes = tree.idx_order(root).unwrap();
    for a in nodes.iter() {
        for b in nodes.iter() {
            let _dist = tree.get_node_distance(a, b, false).unwrap();
        }
    }
}

fn from_elem(c: &mut Criterion) {
    for n_leaves in [50, 200] {
        let tree = random_tree(n_leaves);
        let root = tree.get_root().unwrap();

        c.bench_with_input(
            BenchmarkId::new("matrix", tree.size().unwrap()),
            &tree,
            |b, s| {
                b.iter(|| distance_matrix(s, &root));
            },
        );

        c.bench_with_input(
            BenchmarkId::new("pairwise", tree.size().unwrap()),
            &tree,
            |b, s| {
                b.iter(|| distance_pairwise(s, &root));
            },
        );
    }
}

criterion_group!(benches, from_elem);
criterion_main!(benches);
