use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

type Rec = (Key, u8);

/// Checks every structural invariant and returns the black height.
fn validate_tree<R: Keyed>(t: &RbTree<R>) -> usize {
    if t.root.is_null() {
        assert_eq!(t.count, 0, "empty tree must have len 0");
        return 0;
    }
    assert_eq!(t.color(t.root), Color::Black, "root must be Black");
    assert!(t.parent(t.root).is_null(), "root must have no parent");

    fn walk<R: Keyed>(t: &RbTree<R>, id: NodeId, lo: Key, hi: Key, seen: &mut usize) -> usize {
        if id.is_null() {
            return 1;
        }
        *seen += 1;
        let key = t.key_of(id);
        assert!(lo <= key && key <= hi, "key {key} outside [{lo}, {hi}]");

        let [l, r] = t.nodes.get(id).children;
        for child in [l, r] {
            if child.is_null() {
                continue;
            }
            assert_eq!(t.parent(child), id, "parent link mismatch");
            if t.is_red(id) {
                assert!(!t.is_red(child), "red node {} has a red child", id.0);
            }
        }

        let lh = walk(t, l, lo, key, seen);
        let rh = walk(t, r, key, hi, seen);
        assert_eq!(lh, rh, "black height differs below node {}", id.0);
        lh + usize::from(t.color(id) == Color::Black)
    }

    let mut seen = 0;
    let black_height = walk(t, t.root, Key::MIN, Key::MAX, &mut seen);
    assert_eq!(seen, t.count, "reachable node count must match len");

    let live = t.nodes.slots.iter().filter(|s| s.is_some()).count();
    assert_eq!(live, t.count, "live arena slots must match len");
    assert_eq!(
        t.nodes.slots.len() - live,
        t.nodes.free.len(),
        "every vacant slot must be on the free list"
    );

    let bound = 2.0 * ((t.count + 1) as f64).log2();
    assert!(
        t.height() as f64 <= bound,
        "height {} exceeds 2*log2(n+1) = {bound}",
        t.height()
    );
    black_height
}

/// Multi-map model: records per key in insertion order.
#[derive(Default)]
struct Model {
    map: BTreeMap<Key, Vec<u8>>,
    len: usize,
}

impl Model {
    fn insert(&mut self, key: Key, tag: u8) {
        self.map.entry(key).or_default().push(tag);
        self.len += 1;
    }

    fn delete(&mut self, key: Key, tag: u8) -> Option<Rec> {
        let tags = self.map.get_mut(&key)?;
        let pos = tags.iter().position(|&t| t == tag)?;
        tags.remove(pos);
        if tags.is_empty() {
            self.map.remove(&key);
        }
        self.len -= 1;
        Some((key, tag))
    }

    fn remove_first(&mut self, key: Key) -> Option<Rec> {
        let tag = *self.map.get(&key)?.first()?;
        self.delete(key, tag)
    }

    fn find_all(&self, key: Key) -> Vec<Rec> {
        self.map
            .get(&key)
            .map(|tags| tags.iter().map(|&t| (key, t)).collect())
            .unwrap_or_default()
    }

    fn range(&self, min: Key, max: Key) -> Vec<Rec> {
        if max < min {
            return Vec::new();
        }
        self.map
            .range(min..=max)
            .flat_map(|(&k, tags)| tags.iter().map(move |&t| (k, t)))
            .collect()
    }

    fn flatten(&self) -> Vec<Rec> {
        self.range(Key::MIN, Key::MAX)
    }
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 50)]
    Insert(
        #[proptest(strategy = "0i64..48")] Key,
        #[proptest(strategy = "0u8..4")] u8,
    ),
    #[proptest(weight = 25)]
    Delete(
        #[proptest(strategy = "0i64..48")] Key,
        #[proptest(strategy = "0u8..4")] u8,
    ),
    #[proptest(weight = 5)]
    RemoveFirst(#[proptest(strategy = "0i64..48")] Key),
    #[proptest(weight = 10)]
    FindAll(#[proptest(strategy = "0i64..48")] Key),
    #[proptest(weight = 10)]
    Range(
        #[proptest(strategy = "-4i64..52")] Key,
        #[proptest(strategy = "-4i64..52")] Key,
    ),
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(any::<Op>(), 0..=1000)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_multimap(ops in ops_strategy()) {
        let mut t: RbTree<Rec> = RbTree::new();
        let mut m = Model::default();

        for op in ops {
            match op {
                Op::Insert(key, tag) => {
                    t.insert((key, tag));
                    m.insert(key, tag);
                }
                Op::Delete(key, tag) => {
                    let got = t.delete(key, &(key, tag)).ok();
                    prop_assert_eq!(got, m.delete(key, tag));
                }
                Op::RemoveFirst(key) => {
                    prop_assert_eq!(t.remove_first(key), m.remove_first(key));
                }
                Op::FindAll(key) => {
                    let got: Vec<Rec> = t.find_all(key).into_iter().copied().collect();
                    prop_assert_eq!(&got, &m.find_all(key));
                    prop_assert_eq!(t.count(key), got.len());
                    match t.find(key) {
                        Some(rec) => prop_assert!(got.contains(rec)),
                        None => prop_assert!(got.is_empty()),
                    }
                }
                Op::Range(min, max) => {
                    let got: Vec<Rec> = t.range(min, max).copied().collect();
                    prop_assert_eq!(got, m.range(min, max));
                }
            }

            prop_assert_eq!(t.len(), m.len);
            validate_tree(&t);
        }

        let got: Vec<Rec> = t.iter().copied().collect();
        prop_assert_eq!(got, m.flatten());
    }

    #[test]
    fn prop_range_query_rejects_inverted(min in any::<Key>(), max in any::<Key>()) {
        let t: RbTree<Key> = [min, max, 0].into_iter().collect();
        let res = t.range_query(min, max);
        if max < min {
            prop_assert_eq!(res, Err(Error::EmptyRange { min, max }));
        } else {
            let got: Vec<Key> = res.unwrap().into_iter().copied().collect();
            let mut expected: Vec<Key> = [min, max, 0]
                .into_iter()
                .filter(|k| (min..=max).contains(k))
                .collect();
            expected.sort();
            prop_assert_eq!(got, expected);
        }
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_set() -> Vec<Rec> {
    vec![(1, 0), (2, 0), (2, 1), (3, 0), (3, 1), (3, 2), (4, 0)]
}

#[test]
fn exhaustive_insert_order_small_set() {
    for_each_permutation(&small_set(), |perm| {
        let mut t: RbTree<Rec> = RbTree::new();
        for &rec in &perm {
            t.insert(rec);
            validate_tree(&t);
        }

        // Equal keys come out in the order they went in.
        let got: Vec<Rec> = t.iter().copied().collect();
        let mut expected = perm.clone();
        expected.sort_by_key(|r| r.0);
        assert_eq!(got, expected);
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys = small_set();

    // Insert in a fixed order, then remove in all permutations.
    let mut base: RbTree<Rec> = RbTree::new();
    base.extend(keys.iter().copied());
    validate_tree(&base);

    for_each_permutation(&keys, |perm| {
        let mut t = base.clone();
        let mut remaining = keys.clone();

        for rec in perm {
            assert_eq!(t.delete(rec.0, &rec), Ok(rec));
            remaining.retain(|r| *r != rec);
            validate_tree(&t);
            let got: Vec<Rec> = t.iter().copied().collect();
            assert_eq!(got, remaining);
        }
        assert_eq!(t.len(), 0);
        assert!(t.root.is_null());
    });
}

#[test]
fn black_height_grows_logarithmically() {
    let mut t: RbTree<Key> = RbTree::new();
    for k in 0..4096 {
        t.insert(k % 97);
    }
    let bh = validate_tree(&t);
    assert!(bh >= 1 && bh <= 14, "unexpected black height {bh}");
    for k in 0..97 {
        assert_eq!(t.count(k), t.find_all(k).len());
    }
}
