//! Accuracy and merge-invariance tests for the quantile sketch.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{QuantileSketch, QuantileSketchConfig};

fn random_keys(count: usize, seed: u64) -> Vec<[u8; 4]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| rng.random_range(0..1_000_000u32).to_be_bytes())
        .collect()
}

/// Builds one sketch per chunk, in the style of parallel sampling tasks.
fn partial_sketches(
    keys: &[[u8; 4]],
    parts: usize,
    config: &QuantileSketchConfig,
) -> Vec<QuantileSketch> {
    let chunk = keys.len().div_ceil(parts);
    keys.chunks(chunk)
        .map(|chunk| {
            let mut sketch = QuantileSketch::new(config.clone());
            chunk.iter().for_each(|k| sketch.insert(k));
            sketch
        })
        .collect()
}

#[test]
fn test_merge_matches_single_pass() {
    let config = QuantileSketchConfig::with_capacity(512).unwrap();
    let keys = random_keys(50_000, 11);

    let mut single = QuantileSketch::new(config.clone());
    keys.iter().for_each(|k| single.insert(k));

    for parts in [1, 3, 7, 16] {
        let mut merged = QuantileSketch::new(config.clone());
        for partial in partial_sketches(&keys, parts, &config) {
            merged.merge_from(&partial).unwrap();
        }
        assert_eq!(merged, single, "parts = {parts}");
    }
}

#[test]
fn test_merge_is_commutative_and_associative() {
    let config = QuantileSketchConfig::with_capacity(128).unwrap();
    let keys = random_keys(9_000, 5);
    let parts = partial_sketches(&keys, 3, &config);
    let (a, b, c) = (&parts[0], &parts[1], &parts[2]);

    let mut ab = a.clone();
    ab.merge_from(b).unwrap();
    let mut ba = b.clone();
    ba.merge_from(a).unwrap();
    assert_eq!(ab, ba);

    let mut ab_c = ab.clone();
    ab_c.merge_from(c).unwrap();
    let mut bc = b.clone();
    bc.merge_from(c).unwrap();
    let mut a_bc = a.clone();
    a_bc.merge_from(&bc).unwrap();
    assert_eq!(ab_c, a_bc);
}

#[test]
fn test_merge_with_empty_is_noop() {
    let keys = random_keys(2_000, 3);
    let mut sketch = QuantileSketch::default();
    keys.iter().for_each(|k| sketch.insert(k));
    let before = sketch.clone();

    sketch.merge_from(&QuantileSketch::default()).unwrap();
    assert_eq!(sketch, before);

    let mut empty = QuantileSketch::default();
    empty.merge_from(&before).unwrap();
    assert_eq!(empty, before);
}

#[test]
fn test_insert_order_does_not_matter() {
    let config = QuantileSketchConfig::with_capacity(64).unwrap();
    let mut keys = random_keys(5_000, 21);
    let mut first = QuantileSketch::new(config.clone());
    keys.iter().for_each(|k| first.insert(k));

    keys.shuffle(&mut StdRng::seed_from_u64(99));
    let mut second = QuantileSketch::new(config);
    keys.iter().for_each(|k| second.insert(k));
    assert_eq!(first, second);
}

/// The rank of each reported quantile must be within a few standard errors
/// (`sqrt(q * (1 - q) / capacity)`) of the requested fraction.
#[test]
fn test_quantile_accuracy() {
    let keys = random_keys(200_000, 42);
    let mut sorted = keys.clone();
    sorted.sort_unstable();

    let mut sketch = QuantileSketch::default();
    keys.iter().for_each(|k| sketch.insert(k));
    assert!(!sketch.is_exact());

    let fractions = (1..20).map(|i| i as f64 / 20.0).collect::<Vec<_>>();
    let answers = sketch.quantiles(&fractions);
    for (q, answer) in fractions.iter().zip(answers) {
        let answer = answer.unwrap();
        let below = sorted.partition_point(|k| &k[..] < answer) as f64 / sorted.len() as f64;
        let at_or_below = sorted.partition_point(|k| &k[..] <= answer) as f64 / sorted.len() as f64;
        assert!(
            below - 0.05 <= *q && *q <= at_or_below + 0.05,
            "q = {q}, rank = [{below}, {at_or_below}]"
        );
    }
}
