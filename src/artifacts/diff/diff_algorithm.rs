//! Myers' O(ND) difference algorithm
//!
//! Finds a shortest edit script between two sequences by exploring diagonals
//! `k = x - y` for increasing edit distances `d`, recording the furthest-reaching
//! `x` on each diagonal. Backtracking through the recorded frontiers recovers the
//! edits in order.

use derive_new::new;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Equal,
    Delete,
    Insert,
}

impl EditKind {
    pub fn marker(&self) -> char {
        match self {
            EditKind::Equal => ' ',
            EditKind::Delete => '-',
            EditKind::Insert => '+',
        }
    }
}

/// One step of an edit script
///
/// `a_index`/`b_index` count how many items of each side precede this edit.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Edit<T> {
    pub kind: EditKind,
    pub a_index: usize,
    pub b_index: usize,
    pub value: T,
}

impl<T> Edit<T> {
    pub fn is_equal(&self) -> bool {
        self.kind == EditKind::Equal
    }
}

impl<T: Display> Display for Edit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind.marker(), self.value)
    }
}

pub trait DiffAlgorithm<T> {
    type Trace;
    type EditPath;

    fn compute_shortest_edit(&self) -> Self::Trace;
    fn backtrack(&self) -> Self::EditPath;
    fn diff(&self) -> Vec<Edit<T>>;
}

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct MyersDiff<'d, T> {
    a: &'d [T],
    b: &'d [T],
}

impl<T> MyersDiff<'_, T> {
    /// Frontier array offset; diagonals range over `-max..=max` and reads touch one beyond
    fn offset(&self) -> usize {
        self.a.len() + self.b.len() + 1
    }
}

impl<T: Eq + Clone> DiffAlgorithm<T> for MyersDiff<'_, T> {
    type Trace = Vec<Vec<isize>>;
    type EditPath = Vec<(isize, isize, isize, isize)>;

    fn compute_shortest_edit(&self) -> Self::Trace {
        let (n, m) = (self.a.len() as isize, self.b.len() as isize);
        let offset = self.offset() as isize;

        let mut v = vec![0isize; 2 * self.offset() + 1];
        let mut trace = Vec::new();

        for d in 0..=(n + m) {
            trace.push(v.clone());

            for k in (-d..=d).step_by(2) {
                let idx = (offset + k) as usize;

                // k == -d can only be reached by an insertion, k == d by a deletion
                let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                    v[idx + 1]
                } else {
                    v[idx - 1] + 1
                };

                let mut y = x - k;
                while x < n && y < m && self.a[x as usize] == self.b[y as usize] {
                    x += 1;
                    y += 1;
                }

                v[idx] = x;

                if x >= n && y >= m {
                    return trace;
                }
            }
        }

        trace
    }

    fn backtrack(&self) -> Self::EditPath {
        let (mut x, mut y) = (self.a.len() as isize, self.b.len() as isize);
        let offset = self.offset() as isize;
        let mut edit_path = Vec::new();

        for (d, v) in self.compute_shortest_edit().iter().enumerate().rev() {
            let d = d as isize;
            let k = x - y;

            let prev_k = if k == -d
                || (k != d && v[(offset + k - 1) as usize] < v[(offset + k + 1) as usize])
            {
                k + 1
            } else {
                k - 1
            };

            let prev_x = v[(offset + prev_k) as usize];
            let prev_y = prev_x - prev_k;

            while x > prev_x && y > prev_y {
                edit_path.push((x - 1, y - 1, x, y));
                x -= 1;
                y -= 1;
            }

            if d > 0 {
                edit_path.push((prev_x, prev_y, x, y));
            }

            (x, y) = (prev_x, prev_y);
        }

        edit_path
    }

    fn diff(&self) -> Vec<Edit<T>> {
        let mut diff = self
            .backtrack()
            .into_iter()
            .map(|(prev_x, prev_y, x, y)| {
                let (a_index, b_index) = (prev_x as usize, prev_y as usize);

                if x == prev_x {
                    Edit::new(EditKind::Insert, a_index, b_index, self.b[b_index].clone())
                } else if y == prev_y {
                    Edit::new(EditKind::Delete, a_index, b_index, self.a[a_index].clone())
                } else {
                    Edit::new(EditKind::Equal, a_index, b_index, self.a[a_index].clone())
                }
            })
            .collect::<Vec<_>>();

        diff.reverse();
        diff
    }
}
