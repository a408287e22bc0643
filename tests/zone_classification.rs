//! Zone classification integration tests.
//!
//! Covers the scalar classifier, the signature cache dispatch paths and the
//! properties that must hold for any probability vector: volume fractions sum
//! to one, basis vectors short-circuit, overlay groups never compete, and the
//! grouped path agrees with per-cell scalar classification.

use facies_core::{
    classify, classify_zone, compute_thresholds, quantize, Axis, AuxiliaryFields, Category,
    DispatchPath, OverlayDefinition, RuleBuilder, RuleDefinition, RuleItem, SignatureCache,
    SignatureCacheConfig, TruncationError, TruncationStructure, ZoneProbabilities,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ─── helpers ─────────────────────────────────────────────────────────────────

fn two_halves() -> TruncationStructure {
    let zone = [Category::new("F1", 1), Category::new("F2", 2)];
    let def = RuleDefinition::new(
        Axis::Horizontal,
        vec![RuleItem::category("F1", 1.0), RuleItem::category("F2", 1.0)],
    )
    .with_fields(["GRF1", "GRF2"]);
    RuleBuilder::new(&zone).build(&def).unwrap()
}

fn single_overlay() -> TruncationStructure {
    let zone = [Category::new("F1", 1), Category::new("F2", 2), Category::new("F3", 3)];
    let def = RuleDefinition::new(
        Axis::Vertical,
        vec![RuleItem::category("F1", 1.0), RuleItem::category("F2", 1.0)],
    )
    .with_overlay(OverlayDefinition::new("F3", ["F1", "F2"], 0.5))
    .with_fields(["GRF1", "GRF2", "GRF3"]);
    RuleBuilder::new(&zone).build(&def).unwrap()
}

/// Six categories: A, B, C, D on a nested background, O1 over {A, B}, O2 over {C, D}.
fn two_overlay_groups() -> TruncationStructure {
    let zone = [
        Category::new("A", 11),
        Category::new("B", 12),
        Category::new("C", 13),
        Category::new("D", 14),
        Category::new("O1", 21),
        Category::new("O2", 22),
    ];
    let def = RuleDefinition::new(
        Axis::Vertical,
        vec![
            RuleItem::category("A", 0.7),
            RuleItem::region(vec![
                RuleItem::category("B", 1.0),
                RuleItem::category("C", 1.0),
                RuleItem::category("A", 0.3),
            ]),
            RuleItem::category("D", 1.0),
        ],
    )
    .with_overlay(OverlayDefinition::new("O1", ["A", "B"], 0.3))
    .with_overlay(OverlayDefinition::new("O2", ["C", "D"], 0.7))
    .with_fields(["x", "y", "z1", "z2"]);
    RuleBuilder::new(&zone).build(&def).unwrap()
}

/// `n` equal vertical bands named B0.. with codes 1..=n.
fn equal_bands(n: usize) -> TruncationStructure {
    let zone: Vec<Category> = (0..n).map(|i| Category::new(format!("B{i}"), i as i32 + 1)).collect();
    let children = zone.iter().map(|c| RuleItem::category(c.name.clone(), 1.0)).collect();
    let def = RuleDefinition::new(Axis::Vertical, children).with_fields(["x", "y"]);
    RuleBuilder::new(&zone).build(&def).unwrap()
}

/// Cell-centred coordinates along `x`, constant `y`.
fn sweep_columns(cells: usize) -> Vec<Vec<f64>> {
    let xs = (0..cells).map(|i| (i as f64 + 0.5) / cells as f64).collect();
    vec![xs, vec![0.5; cells]]
}

/// Classify a zone where every cell carries `vector`, through the grouped
/// path, and check each cell against scalar classification of `vector`.
fn assert_grouped_row_matches_scalar(s: &TruncationStructure, vector: &[f64], cells: usize) -> Vec<u64> {
    let probabilities: Vec<Vec<f64>> = vector.iter().map(|&p| vec![p; cells]).collect();
    let coords = sweep_columns(cells);
    let fields = AuxiliaryFields::from_vecs(&coords).unwrap();
    let zone = classify_zone(s, ZoneProbabilities::PerCell(&probabilities), &fields, 100).unwrap();
    assert_eq!(zone.path, DispatchPath::Grouped);
    assert_eq!(zone.stats.distinct_signatures, 1);

    let t = compute_thresholds(s, vector).unwrap();
    for cell in 0..cells {
        let expected = classify(s, &t, &row(&coords, cell)).unwrap();
        assert_eq!(zone.codes[cell], expected, "cell {cell} for {vector:?}");
    }
    zone.counts
}

fn random_columns(rng: &mut StdRng, fields: usize, cells: usize) -> Vec<Vec<f64>> {
    (0..fields)
        .map(|_| (0..cells).map(|_| rng.gen::<f64>()).collect())
        .collect()
}

fn random_vector(rng: &mut StdRng, n: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n).map(|_| rng.gen::<f64>() + 0.01).collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|p| p / sum).collect()
}

/// Per-category arrays where every cell picks one of `palette`'s vectors.
fn palette_columns(rng: &mut StdRng, palette: &[Vec<f64>], cells: usize) -> Vec<Vec<f64>> {
    let n = palette[0].len();
    let mut columns = vec![Vec::with_capacity(cells); n];
    for _ in 0..cells {
        let choice = &palette[rng.gen_range(0..palette.len())];
        for (column, &p) in columns.iter_mut().zip(choice) {
            column.push(p);
        }
    }
    columns
}

fn row(columns: &[Vec<f64>], cell: usize) -> Vec<f64> {
    columns.iter().map(|c| c[cell]).collect()
}

// ─── concrete scenarios ──────────────────────────────────────────────────────

#[test]
fn test_horizontal_split_uses_second_field() {
    let s = two_halves();
    let t = compute_thresholds(&s, &[0.5, 0.5]).unwrap();
    assert_eq!(classify(&s, &t, &[0.3, 0.2]).unwrap(), 1);
    assert_eq!(classify(&s, &t, &[0.3, 0.5]).unwrap(), 1);
    assert_eq!(classify(&s, &t, &[0.3, 0.51]).unwrap(), 2);
    assert_eq!(classify(&s, &t, &[0.9, 0.2]).unwrap(), 1);
}

#[test]
fn test_overlay_reassigns_background_inside_interval() {
    let s = single_overlay();
    let t = compute_thresholds(&s, &[0.4, 0.4, 0.2]).unwrap();
    let interval = t.interval(0);
    assert!((interval.delta_h - 0.8).abs() < 1e-12);
    assert!(interval.contains(0.5));
    assert!(!interval.contains(0.05));

    // background lands on F1 (x < 0.5)
    assert_eq!(classify(&s, &t, &[0.2, 0.5, 0.5]).unwrap(), 3);
    assert_eq!(classify(&s, &t, &[0.2, 0.5, 0.05]).unwrap(), 1);
}

#[test]
fn test_zone_volume_fractions_match_probabilities() {
    let s = single_overlay();
    let mut rng = StdRng::seed_from_u64(7);
    let cells = 40_000;
    let columns = random_columns(&mut rng, 3, cells);
    let fields = AuxiliaryFields::from_vecs(&columns).unwrap();
    let zone = classify_zone(&s, ZoneProbabilities::Constant(&[0.4, 0.4, 0.2]), &fields, 100).unwrap();

    assert_eq!(zone.path, DispatchPath::Constant);
    for (got, want) in zone.volume_fractions.iter().zip([0.4, 0.4, 0.2]) {
        assert!((got - want).abs() < 0.02, "got {got}, want {want}");
    }
}

#[test]
fn test_overlay_groups_route_by_background() {
    let s = two_overlay_groups();
    let groups = s.overlay_groups();
    assert!(groups[0].background.iter().all(|c| !groups[1].background.contains(c)));

    let t = compute_thresholds(&s, &[0.2, 0.15, 0.15, 0.2, 0.15, 0.15]).unwrap();
    let z1 = 0.5 * (t.interval(0).low + t.interval(0).high);
    let z2 = 0.5 * (t.interval(1).low + t.interval(1).high);
    // both intervals hit; the left edge lands on A, the right edge on D
    assert_eq!(classify(&s, &t, &[0.01, 0.5, z1, z2]).unwrap(), 21);
    assert_eq!(classify(&s, &t, &[0.99, 0.5, z1, z2]).unwrap(), 22);
}

#[test]
fn test_grouped_dispatch_with_few_signatures() {
    let s = two_overlay_groups();
    let mut rng = StdRng::seed_from_u64(11);
    let palette: Vec<Vec<f64>> = (0..5).map(|_| random_vector(&mut rng, 6)).collect();
    let cells = 2_000;
    let probabilities = palette_columns(&mut rng, &palette, cells);
    let coords = random_columns(&mut rng, 4, cells);
    let fields = AuxiliaryFields::from_vecs(&coords).unwrap();

    let zone = classify_zone(&s, ZoneProbabilities::PerCell(&probabilities), &fields, 100).unwrap();
    assert_eq!(zone.path, DispatchPath::Grouped);
    assert!(zone.stats.distinct_signatures <= palette.len());
    assert_eq!(zone.stats.threshold_computations, zone.stats.distinct_signatures);
    assert_eq!(zone.stats.batched_cells + zone.stats.scalar_cells, cells);
}

#[test]
fn test_per_cell_dispatch_with_many_signatures() {
    let s = single_overlay();
    let mut rng = StdRng::seed_from_u64(13);
    let cells = 300;
    let probabilities = random_columns(&mut rng, 3, cells);
    let coords = random_columns(&mut rng, 3, cells);
    let fields = AuxiliaryFields::from_vecs(&coords).unwrap();

    let zone = classify_zone(&s, ZoneProbabilities::PerCell(&probabilities), &fields, 1000).unwrap();
    assert_eq!(zone.path, DispatchPath::PerCell);
    assert_eq!(zone.stats.threshold_computations, cells);

    // per-cell evaluation uses the unquantized vectors
    for cell in 0..cells {
        let t = compute_thresholds(&s, &row(&probabilities, cell)).unwrap();
        let expected = classify(&s, &t, &row(&coords, cell)).unwrap();
        assert_eq!(zone.codes[cell], expected, "cell {cell}");
    }
}

#[test]
fn test_grouped_path_normalizes_rows() {
    let s = equal_bands(3);
    let counts = assert_grouped_row_matches_scalar(&s, &[0.02, 0.04, 0.04], 300);
    assert_eq!(counts, [60, 120, 120]);
}

#[test]
fn test_grouped_path_reads_zero_row_as_uniform() {
    let s = equal_bands(4);
    let counts = assert_grouped_row_matches_scalar(&s, &[0.0; 4], 400);
    assert_eq!(counts, [100; 4]);
}

#[test]
fn test_missing_coordinate_is_rejected() {
    let s = single_overlay();
    let t = compute_thresholds(&s, &[0.4, 0.4, 0.2]).unwrap();
    let err = classify(&s, &t, &[0.2, 0.5]).unwrap_err();
    assert!(matches!(err, TruncationError::DimensionMismatch { expected: 3, found: 2, .. }));

    let coords = vec![vec![0.1; 4], vec![0.2; 4]];
    let fields = AuxiliaryFields::from_vecs(&coords).unwrap();
    let err = classify_zone(&s, ZoneProbabilities::Constant(&[0.4, 0.4, 0.2]), &fields, 100).unwrap_err();
    assert!(matches!(err, TruncationError::DimensionMismatch { .. }));
}

#[test]
fn test_failed_update_invalidates_thresholds() {
    let s = single_overlay();
    let mut t = compute_thresholds(&s, &[0.4, 0.4, 0.2]).unwrap();
    assert!(t.is_computed());
    assert_eq!(classify(&s, &t, &[0.2, 0.5, 0.5]).unwrap(), 3);

    let err = t.update(&s, &[0.4, -0.1, 0.2]).unwrap_err();
    assert!(matches!(err, TruncationError::InvalidProbability { slot: 1, .. }));
    assert!(!t.is_computed());
    assert_eq!(
        classify(&s, &t, &[0.2, 0.5, 0.5]).unwrap_err(),
        TruncationError::ThresholdsNotComputed
    );
    assert_eq!(t.polygons(&s).count(), 0);

    t.update(&s, &[0.4, 0.4, 0.2]).unwrap();
    assert_eq!(classify(&s, &t, &[0.2, 0.5, 0.5]).unwrap(), 3);
}

#[test]
fn test_invalid_cache_config_is_rejected() {
    let s = two_halves();
    let config = SignatureCacheConfig {
        resolution: 20,
        ..SignatureCacheConfig::default()
    };
    assert!(matches!(
        SignatureCache::new(&s, config),
        Err(TruncationError::InvalidConfig(_))
    ));
}

// ─── properties ──────────────────────────────────────────────────────────────

fn probability_vector(n: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..1.0, n).prop_filter("non-zero mass", |v| v.iter().sum::<f64>() > 1e-3)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_volume_fractions_sum_to_one(probs in probability_vector(6), seed in any::<u64>()) {
        let s = two_overlay_groups();
        let mut rng = StdRng::seed_from_u64(seed);
        let coords = random_columns(&mut rng, 4, 500);
        let fields = AuxiliaryFields::from_vecs(&coords).unwrap();
        let zone = classify_zone(&s, ZoneProbabilities::Constant(&probs), &fields, 100).unwrap();
        let total: f64 = zone.volume_fractions.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
        prop_assert_eq!(zone.counts.iter().sum::<u64>(), 500);
    }

    #[test]
    fn prop_classification_is_pure(
        probs in probability_vector(6),
        coord in prop::collection::vec(0.0f64..=1.0, 4),
    ) {
        let s = two_overlay_groups();
        let first = classify(&s, &compute_thresholds(&s, &probs).unwrap(), &coord).unwrap();
        let second = classify(&s, &compute_thresholds(&s, &probs).unwrap(), &coord).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_basis_vector_takes_every_cell(
        k in 0usize..6,
        coord in prop::collection::vec(0.0f64..=1.0, 4),
    ) {
        let s = two_overlay_groups();
        let mut probs = vec![0.0; 6];
        probs[k] = 1.0;
        let t = compute_thresholds(&s, &probs).unwrap();
        let code = classify(&s, &t, &coord).unwrap();
        prop_assert_eq!(code, s.code_of_slot(k));
    }

    #[test]
    fn prop_overlay_code_requires_its_interval(
        probs in probability_vector(6),
        coord in prop::collection::vec(0.0f64..=1.0, 4),
    ) {
        let s = two_overlay_groups();
        let t = compute_thresholds(&s, &probs).unwrap();
        prop_assume!(t.determined().is_none());
        let code = classify(&s, &t, &coord).unwrap();
        if code == 21 {
            prop_assert!(t.interval(0).contains(coord[2]));
        }
        if code == 22 {
            prop_assert!(t.interval(1).contains(coord[3]));
        }
    }

    #[test]
    fn prop_grouped_matches_scalar(seed in any::<u64>(), palette_size in 1usize..6) {
        let s = two_overlay_groups();
        let mut rng = StdRng::seed_from_u64(seed);
        let palette: Vec<Vec<f64>> = (0..palette_size).map(|_| random_vector(&mut rng, 6)).collect();
        let cells = 400;
        let probabilities = palette_columns(&mut rng, &palette, cells);
        let coords = random_columns(&mut rng, 4, cells);
        let fields = AuxiliaryFields::from_vecs(&coords).unwrap();

        let zone = classify_zone(&s, ZoneProbabilities::PerCell(&probabilities), &fields, 100).unwrap();
        prop_assert_eq!(zone.path, DispatchPath::Grouped);
        for cell in 0..cells {
            let quantized = quantize(&row(&probabilities, cell), 100);
            let t = compute_thresholds(&s, &quantized).unwrap();
            let expected = classify(&s, &t, &row(&coords, cell)).unwrap();
            prop_assert_eq!(zone.codes[cell], expected, "cell {}", cell);
        }
    }
}

#[cfg(feature = "parallel")]
mod parallel {
    use super::*;

    #[test]
    fn test_parallel_groups_match_scalar() {
        let s = two_overlay_groups();
        let mut rng = StdRng::seed_from_u64(29);
        let palette: Vec<Vec<f64>> = (0..8).map(|_| random_vector(&mut rng, 6)).collect();
        let cells = 3_000;
        let mut probabilities = palette_columns(&mut rng, &palette, cells);
        // one cell with its own signature goes through the single-cell branch
        for (slot, column) in probabilities.iter_mut().enumerate() {
            column[0] = if slot == 0 { 1.0 } else { 0.0 };
        }
        let coords = random_columns(&mut rng, 4, cells);
        let fields = AuxiliaryFields::from_vecs(&coords).unwrap();

        let zone = classify_zone(&s, ZoneProbabilities::PerCell(&probabilities), &fields, 100).unwrap();
        assert_eq!(zone.path, DispatchPath::Grouped);

        let mut counts = vec![0u64; s.num_categories()];
        for cell in 0..cells {
            let quantized = quantize(&row(&probabilities, cell), 100);
            let t = compute_thresholds(&s, &quantized).unwrap();
            let expected = classify(&s, &t, &row(&coords, cell)).unwrap();
            assert_eq!(zone.codes[cell], expected, "cell {cell}");
            let slot = (0..s.num_categories()).find(|&k| s.code_of_slot(k) == expected).unwrap();
            counts[slot] += 1;
        }
        assert_eq!(zone.counts, counts);
        assert_eq!(zone.stats.threshold_computations, zone.stats.distinct_signatures);
        assert_eq!(zone.stats.batched_cells + zone.stats.scalar_cells, cells);
        assert!(zone.stats.scalar_cells >= 1);
        assert!(zone.stats.determined_cells >= 1);
    }
}
