//! The hybrid scoring function.
//!
//! Maps (candidate item, user profile, configuration) to a score in [0, 1]
//! together with the sub-scores it was built from. Pure and deterministic:
//! the same inputs always give the same breakdown, which is what makes two
//! experiments comparable.

use domain::{CandidateItem, CastTiers, HyperParams, UserProfile};
use serde::Serialize;
use std::collections::HashMap;

/// Sub-scores of one scored item.
///
/// Every component is in [0, 1]; `genre_boost` is the signed adjustment
/// applied before clamping `hybrid_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub genre_sim: f64,
    pub cast_sim: f64,
    pub franchise_sim: f64,
    pub rating_norm: f64,
    pub popularity_score: f64,
    pub genre_boost: f64,
    pub hybrid_score: f64,
}

impl ScoreBreakdown {
    /// Components in the same order as `ComponentWeights::to_array`
    pub fn components(&self) -> [f64; 5] {
        [
            self.genre_sim,
            self.cast_sim,
            self.franchise_sim,
            self.rating_norm,
            self.popularity_score,
        ]
    }
}

/// Score one item for one user under `params`.
pub fn score(item: &CandidateItem, profile: &UserProfile, params: &HyperParams) -> ScoreBreakdown {
    let genre_sim = genre_similarity(item, profile);
    let cast_sim = cast_similarity(item, profile, params.cast_tiers());
    let franchise_sim = franchise_similarity(item, profile);
    let rating_norm = clamp01(item.avg_rating / 10.0);
    let popularity_score = popularity(item, params);
    let genre_boost = params.genre_boost().boost_for(genre_sim);

    let weighted: f64 = params
        .weights()
        .to_array()
        .iter()
        .zip([genre_sim, cast_sim, franchise_sim, rating_norm, popularity_score])
        .map(|(w, c)| w * c)
        .sum();

    ScoreBreakdown {
        genre_sim,
        cast_sim,
        franchise_sim,
        rating_norm,
        popularity_score,
        genre_boost,
        hybrid_score: clamp01(weighted + genre_boost),
    }
}

/// Jaccard similarity between the item's genres and the user's preferred genres.
///
/// 0 if either set is empty.
pub fn genre_similarity(item: &CandidateItem, profile: &UserProfile) -> f64 {
    let item_genres = item.genre_set();
    let user_genres = profile.preferred_genres();
    if item_genres.is_empty() || user_genres.is_empty() {
        return 0.0;
    }

    let intersection = item_genres.intersection(&user_genres).count() as f64;
    let union = item_genres.union(&user_genres).count() as f64;
    intersection / union
}

/// Tier-weighted cast overlap.
///
/// ## Algorithm
/// - Item cast weights come from billing position in the item's cast list
/// - User cast weights come from position in the user's favorite cast list
/// - Score = Σ user weight over the overlap / Σ item weights, clamped to 1.0
pub fn cast_similarity(item: &CandidateItem, profile: &UserProfile, tiers: &CastTiers) -> f64 {
    if item.cast.is_empty() || profile.favorite_cast.is_empty() {
        return 0.0;
    }

    let item_weights = tiered_weights(&item.cast, tiers);
    let item_total: f64 = item_weights.values().sum();
    if item_total <= 0.0 {
        return 0.0;
    }

    let user_weights = tiered_weights(&profile.favorite_cast, tiers);
    let overlap: f64 = user_weights
        .iter()
        .filter(|(name, _)| item_weights.contains_key(*name))
        .map(|(_, w)| w)
        .sum();

    (overlap / item_total).min(1.0)
}

/// 1.0 if the item belongs to a franchise the user has watched
pub fn franchise_similarity(item: &CandidateItem, profile: &UserProfile) -> f64 {
    match item.franchise_id {
        Some(id) if profile.franchises.contains(&id) => 1.0,
        _ => 0.0,
    }
}

/// Blend of normalized rating and log-scaled rating volume.
///
/// A title with 999 ratings reaches the full volume score (log10(1000) / 3 = 1).
pub fn popularity(item: &CandidateItem, params: &HyperParams) -> f64 {
    let mix = params.popularity();
    let rating_part = clamp01(item.avg_rating / 10.0);
    let count_part = ((item.rating_count as f64 + 1.0).log10() / 3.0).min(1.0);
    clamp01(mix.rating_weight * rating_part + mix.count_weight * count_part)
}

/// Weight per distinct name, keeping the first (best) billing position.
fn tiered_weights<'a>(names: &'a [String], tiers: &CastTiers) -> HashMap<&'a str, f64> {
    let mut weights = HashMap::with_capacity(names.len());
    for (position, name) in names.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        weights.entry(name).or_insert_with(|| tiers.weight_for(position));
    }
    weights
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(genres: &[&str], cast: &[&str]) -> CandidateItem {
        CandidateItem {
            id: 1,
            title: "Test".to_string(),
            genres: genres.iter().map(|s| s.to_string()).collect(),
            cast: cast.iter().map(|s| s.to_string()).collect(),
            franchise_id: Some(9),
            avg_rating: 8.0,
            rating_count: 999,
        }
    }

    fn profile(genres: &[&str], cast: &[&str]) -> UserProfile {
        let mut profile = UserProfile::new(1);
        for g in genres {
            profile.genre_preferences.insert(g.to_string(), 0.5);
        }
        profile.favorite_cast = cast.iter().map(|s| s.to_string()).collect();
        profile
    }

    #[test]
    fn test_genre_jaccard() {
        let it = item(&["Action", "Sci-Fi", "Drama"], &[]);
        let p = profile(&["Action", "Sci-Fi"], &[]);
        assert!((genre_similarity(&it, &p) - 2.0 / 3.0).abs() < 1e-12);

        let empty = profile(&[], &[]);
        assert_eq!(genre_similarity(&it, &empty), 0.0);
    }

    #[test]
    fn test_cast_overlap_is_tiered() {
        let cast: Vec<String> = (0..20).map(|i| format!("Actor {}", i)).collect();
        let cast_refs: Vec<&str> = cast.iter().map(|s| s.as_str()).collect();
        let it = item(&[], &cast_refs);
        // Item total: 5 * 1.0 + 10 * 0.7 + 5 * 0.3 = 13.5
        let p = profile(&[], &["Actor 0"]);
        let sim = cast_similarity(&it, &p, HyperParams::default().cast_tiers());
        assert!((sim - 1.0 / 13.5).abs() < 1e-12);
    }

    #[test]
    fn test_cast_similarity_clamped_to_one() {
        let it = item(&[], &["A"]);
        let p = profile(&[], &["A"]);
        assert_eq!(cast_similarity(&it, &p, HyperParams::default().cast_tiers()), 1.0);
    }

    #[test]
    fn test_high_similarity_gets_high_boost() {
        // 4 of 5 genres shared -> Jaccard 0.8, above the 0.7 threshold
        let it = item(&["A", "B", "C", "D"], &[]);
        let p = profile(&["A", "B", "C", "D", "E"], &[]);
        let params = HyperParams::default();
        let breakdown = score(&it, &p, &params);

        assert!((breakdown.genre_sim - 0.8).abs() < 1e-12);
        assert_eq!(breakdown.genre_boost, 0.15);

        let w = params.weights();
        let expected = w.genre * breakdown.genre_sim
            + w.cast * breakdown.cast_sim
            + w.franchise * breakdown.franchise_sim
            + w.rating * breakdown.rating_norm
            + w.popularity * breakdown.popularity_score
            + 0.15;
        assert!((breakdown.hybrid_score - expected.clamp(0.0, 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_hybrid_score_stays_in_unit_interval() {
        let params = HyperParams::default();

        // Penalty path: no genre overlap, nothing else going for the item
        let mut weak = item(&["Horror"], &[]);
        weak.avg_rating = 0.0;
        weak.rating_count = 0;
        weak.franchise_id = None;
        let low = score(&weak, &profile(&["Comedy"], &[]), &params);
        assert_eq!(low.genre_boost, -0.20);
        assert_eq!(low.hybrid_score, 0.0);

        // Boost path with every component maxed out
        let mut strong = item(&["Comedy"], &["A"]);
        strong.avg_rating = 10.0;
        let mut p = profile(&["Comedy"], &["A"]);
        p.franchises.insert(9);
        let high = score(&strong, &p, &params);
        assert_eq!(high.hybrid_score, 1.0);
    }

    #[test]
    fn test_popularity_formula() {
        let params = HyperParams::default();
        let it = item(&[], &[]);
        // 0.7 * 0.8 + 0.3 * 1.0
        assert!((popularity(&it, &params) - 0.86).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_deterministic() {
        let it = item(&["Action"], &["A", "B"]);
        let p = profile(&["Action", "Drama"], &["B"]);
        let params = HyperParams::default();
        assert_eq!(score(&it, &p, &params), score(&it, &p, &params));
    }
}
