//! The `digraph` algorithm of DeRemer and Pennello.
//!
//! Given a relation `R` over nodes `0..n` and a seed value `F'(x)` per node,
//! computes the smallest `F` satisfying `F(x) = F'(x) ∪ ⋃ { F(y) | x R y }`.
//! Strongly connected components are detected during the traversal and all
//! of their members receive the same, fully unioned value.

use std::cmp;

pub trait Set {
    fn union_with(&mut self, other: &Self);
}

/// Compute the closure of `seeds` over the relation given by `edges`.
///
/// `edges(x)` enumerates every `y` such that `x R y`.
pub fn digraph<T, F, I>(seeds: Vec<T>, edges: F) -> Vec<T>
where
    T: Set + Clone,
    F: Fn(usize) -> I,
    I: IntoIterator<Item = usize>,
{
    let len = seeds.len();
    let mut digraph = Digraph {
        result: seeds,
        edges,
        n: vec![0usize; len],
        stack: vec![],
    };
    for x in 0..len {
        if digraph.n[x] == 0 {
            digraph.traverse(x);
        }
    }
    digraph.result
}

struct Digraph<T, F> {
    result: Vec<T>,
    edges: F,
    // visitation numbers: 0 = unvisited, usize::MAX = finished.
    n: Vec<usize>,
    stack: Vec<usize>,
}

impl<T, F, I> Digraph<T, F>
where
    T: Set + Clone,
    F: Fn(usize) -> I,
    I: IntoIterator<Item = usize>,
{
    /// Depth-first traversal from `root`, driven by an explicit frame stack
    /// so that long relation chains do not exhaust the call stack.
    fn traverse(&mut self, root: usize) {
        let mut frames = vec![];
        self.enter(root, &mut frames);

        while let Some(frame) = frames.last_mut() {
            let x = frame.node;
            let Some(&y) = frame.successors.get(frame.next) else {
                let d = frame.depth;
                frames.pop();
                self.leave(x, d);
                continue;
            };

            if self.n[y] == 0 {
                // Revisit `y` in this frame once its own traversal is done.
                self.enter(y, &mut frames);
                continue;
            }
            frame.next += 1;

            self.n[x] = cmp::min(self.n[x], self.n[y]);
            if x != y {
                // F(x) <- F(x) \cup F(y)
                let (slot, added) = get_two_mut(&mut self.result, x, y);
                slot.union_with(added);
            }
        }
    }

    fn enter(&mut self, x: usize, frames: &mut Vec<Frame>) {
        self.stack.push(x);
        let depth = self.stack.len();
        self.n[x] = depth;
        frames.push(Frame {
            node: x,
            depth,
            successors: (self.edges)(x).into_iter().collect(),
            next: 0,
        });
    }

    fn leave(&mut self, x: usize, d: usize) {
        if self.n[x] != d {
            return;
        }

        // x is the root of a strongly connected component.
        while let Some(s) = self.stack.pop() {
            self.n[s] = usize::MAX;
            if s == x {
                break;
            }
            // F(s) <- F(x)
            self.result[s] = self.result[x].clone();
        }
    }
}

struct Frame {
    node: usize,
    depth: usize,
    successors: Vec<usize>,
    next: usize,
}

fn get_two_mut<V>(slice: &mut [V], x: usize, y: usize) -> (&mut V, &mut V) {
    assert!(
        x != y && cmp::max(x, y) < slice.len(),
        "index condition not satisfied"
    );
    let i = (x + y) / 2 + 1;
    let (a, b) = slice.split_at_mut(i);
    if x < y {
        (&mut a[x], &mut b[y - i])
    } else {
        (&mut b[x - i], &mut a[y])
    }
}
