//! # Zone Classification Walkthrough
//!
//! Builds a four-facies rule with one overlay, prints the truncation map for
//! the zone's average probabilities, then classifies a synthetic 100 × 100
//! layer whose probabilities trend from sand-rich to shale-rich.

use facies_core::{
    compute_thresholds, Axis, AuxiliaryFields, Category, OverlayDefinition, RuleBuilder,
    RuleDefinition, RuleItem, SignatureCache, SignatureCacheConfig, ZoneProbabilities,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NX: usize = 100;
const NY: usize = 100;

fn main() {
    // ── Rule ─────────────────────────────────────────────────────────────────

    let zone = [
        Category::new("sand", 1),
        Category::new("shale", 2),
        Category::new("silt", 3),
        Category::new("calcite", 4),
    ];
    let definition = RuleDefinition::new(
        Axis::Horizontal,
        vec![
            RuleItem::category("shale", 0.8),
            RuleItem::region(vec![
                RuleItem::category("sand", 1.0),
                RuleItem::category("silt", 1.0),
                RuleItem::category("shale", 0.2),
            ]),
        ],
    )
    .with_overlay(OverlayDefinition::new("calcite", ["sand", "silt"], 0.5))
    .with_fields(["grf1", "grf2", "grf_calcite"]);

    let rule = match RuleBuilder::new(&zone).build(&definition) {
        Ok(rule) => rule,
        Err(e) => {
            eprintln!("rule rejected: {e}");
            return;
        }
    };

    // ── Truncation map ───────────────────────────────────────────────────────

    let average = [0.35, 0.4, 0.15, 0.1];
    let thresholds = compute_thresholds(&rule, &average).expect("average probabilities");
    println!("Truncation map for {average:?}");
    for (_, order, polygon) in thresholds.polygons(&rule) {
        let (x0, y0) = polygon.corners[0];
        let (x1, y1) = polygon.corners[2];
        println!(
            "  {:<8} x [{x0:.3}, {x1:.3}]  y [{y0:.3}, {y1:.3}]  area {:.3}",
            rule.category(order).name,
            polygon.area()
        );
    }
    for (group, interval) in rule.overlay_groups().iter().zip(thresholds.overlay_intervals()) {
        println!(
            "  {:<8} ({:.3}, {:.3}]  deltaH {:.3}",
            rule.category(group.overlay).name,
            interval.low,
            interval.high,
            interval.delta_h
        );
    }

    // ── Layer ────────────────────────────────────────────────────────────────

    let mut rng = StdRng::seed_from_u64(2026);
    let cells = NX * NY;
    let fields: Vec<Vec<f64>> = (0..3).map(|_| (0..cells).map(|_| rng.gen()).collect()).collect();

    // sand fraction steps down in ten bands along i
    let mut probabilities = vec![Vec::with_capacity(cells); 4];
    for _j in 0..NY {
        for i in 0..NX {
            let band = (i / 10) as f64 / 9.0;
            let sand = 0.6 - 0.4 * band;
            let shale = 0.2 + 0.4 * band;
            for (column, p) in probabilities.iter_mut().zip([sand, shale, 0.12, 0.08]) {
                column.push(p);
            }
        }
    }

    let fields = AuxiliaryFields::from_vecs(&fields).expect("equal-length fields");
    let cache = SignatureCache::new(&rule, SignatureCacheConfig::default()).expect("default config");
    let layer = cache
        .classify_zone(ZoneProbabilities::PerCell(&probabilities), &fields)
        .expect("layer classification");

    println!();
    println!("Layer of {cells} cells via {:?}", layer.path);
    println!(
        "  {} distinct signatures, {} threshold computations",
        layer.stats.distinct_signatures, layer.stats.threshold_computations
    );
    for (category, fraction) in zone.iter().zip(&layer.volume_fractions) {
        println!("  {:<8} {:.3}", category.name, fraction);
    }
}
