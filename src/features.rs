use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Window used for the venue-specific (home-only / away-only) form block.
pub const VENUE_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Home, Side::Away];

    pub fn prefix(self) -> &'static str {
        match self {
            Side::Home => "home_",
            Side::Away => "away_",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormStat {
    PointsLast,
    PointsAvg,
    GoalsForLast,
    GoalsAgainstLast,
    GoalsForAvg,
    GoalsAgainstAvg,
    GoalDiff,
    WinsLast,
    DrawsLast,
    LossesLast,
    WinRate,
    CleanSheets,
    FailedToScore,
    MatchesUsed,
}

impl FormStat {
    pub const ALL: [FormStat; 14] = [
        FormStat::PointsLast,
        FormStat::PointsAvg,
        FormStat::GoalsForLast,
        FormStat::GoalsAgainstLast,
        FormStat::GoalsForAvg,
        FormStat::GoalsAgainstAvg,
        FormStat::GoalDiff,
        FormStat::WinsLast,
        FormStat::DrawsLast,
        FormStat::LossesLast,
        FormStat::WinRate,
        FormStat::CleanSheets,
        FormStat::FailedToScore,
        FormStat::MatchesUsed,
    ];

    fn stem(self) -> &'static str {
        match self {
            FormStat::PointsLast => "points_last",
            FormStat::PointsAvg => "points_avg",
            FormStat::GoalsForLast => "goals_for_last",
            FormStat::GoalsAgainstLast => "goals_against_last",
            FormStat::GoalsForAvg => "goals_for_avg",
            FormStat::GoalsAgainstAvg => "goals_against_avg",
            FormStat::GoalDiff => "goal_diff",
            FormStat::WinsLast => "wins_last",
            FormStat::DrawsLast => "draws_last",
            FormStat::LossesLast => "losses_last",
            FormStat::WinRate => "win_rate",
            FormStat::CleanSheets => "clean_sheets",
            FormStat::FailedToScore => "failed_to_score",
            FormStat::MatchesUsed => "matches_used",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreakStat {
    WinStreak,
    UnbeatenStreak,
    WinlessStreak,
    RecentResultsCode,
}

impl StreakStat {
    pub const ALL: [StreakStat; 4] = [
        StreakStat::WinStreak,
        StreakStat::UnbeatenStreak,
        StreakStat::WinlessStreak,
        StreakStat::RecentResultsCode,
    ];

    fn stem(self) -> &'static str {
        match self {
            StreakStat::WinStreak => "win_streak",
            StreakStat::UnbeatenStreak => "unbeaten_streak",
            StreakStat::WinlessStreak => "winless_streak",
            StreakStat::RecentResultsCode => "recent_results_code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VenueStat {
    Points,
    GoalsAvg,
    Matches,
}

impl VenueStat {
    pub const ALL: [VenueStat; 3] = [VenueStat::Points, VenueStat::GoalsAvg, VenueStat::Matches];

    fn stem(self) -> &'static str {
        match self {
            VenueStat::Points => "form_points_5",
            VenueStat::GoalsAvg => "form_goals_avg",
            VenueStat::Matches => "form_matches",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StandingStat {
    Position,
    Points,
    GoalDiff,
    Ppg,
    Played,
    Wins,
    Draws,
    Losses,
    GoalsFor,
    GoalsAgainst,
    WinRatio,
    GoalsPerGame,
    ConcededPerGame,
    HomeWins,
    HomePpg,
    HomeGoalsPerGame,
    AwayWins,
    AwayPpg,
    AwayGoalsPerGame,
}

impl StandingStat {
    pub const ALL: [StandingStat; 19] = [
        StandingStat::Position,
        StandingStat::Points,
        StandingStat::GoalDiff,
        StandingStat::Ppg,
        StandingStat::Played,
        StandingStat::Wins,
        StandingStat::Draws,
        StandingStat::Losses,
        StandingStat::GoalsFor,
        StandingStat::GoalsAgainst,
        StandingStat::WinRatio,
        StandingStat::GoalsPerGame,
        StandingStat::ConcededPerGame,
        StandingStat::HomeWins,
        StandingStat::HomePpg,
        StandingStat::HomeGoalsPerGame,
        StandingStat::AwayWins,
        StandingStat::AwayPpg,
        StandingStat::AwayGoalsPerGame,
    ];

    fn stem(self) -> &'static str {
        match self {
            StandingStat::Position => "position",
            StandingStat::Points => "points",
            StandingStat::GoalDiff => "goal_diff",
            StandingStat::Ppg => "ppg",
            StandingStat::Played => "played",
            StandingStat::Wins => "wins",
            StandingStat::Draws => "draws",
            StandingStat::Losses => "losses",
            StandingStat::GoalsFor => "goals_for",
            StandingStat::GoalsAgainst => "goals_against",
            StandingStat::WinRatio => "win_ratio",
            StandingStat::GoalsPerGame => "goals_per_game",
            StandingStat::ConcededPerGame => "conceded_per_game",
            StandingStat::HomeWins => "home_wins",
            StandingStat::HomePpg => "home_ppg",
            StandingStat::HomeGoalsPerGame => "home_goals_per_game",
            StandingStat::AwayWins => "away_wins",
            StandingStat::AwayPpg => "away_ppg",
            StandingStat::AwayGoalsPerGame => "away_goals_per_game",
        }
    }
}

/// Standings deltas. Positive favours the home team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiffStat {
    Position,
    Points,
    GoalDiff,
    Ppg,
    WinRatio,
}

impl DiffStat {
    pub const ALL: [DiffStat; 5] = [
        DiffStat::Position,
        DiffStat::Points,
        DiffStat::GoalDiff,
        DiffStat::Ppg,
        DiffStat::WinRatio,
    ];

    fn name(self) -> &'static str {
        match self {
            DiffStat::Position => "diff_position",
            DiffStat::Points => "diff_points",
            DiffStat::GoalDiff => "diff_goal_diff",
            DiffStat::Ppg => "diff_ppg",
            DiffStat::WinRatio => "diff_win_ratio",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum H2hStat {
    TotalMatches,
    HomeWins,
    AwayWins,
    Draws,
    HomeWinRate,
    AwayWinRate,
    DrawRate,
    HomeGoalsAvg,
    AwayGoalsAvg,
    TotalGoalsAvg,
    Dominance,
    RecentHomeWins,
    RecentHomeRate,
    RecentWeightedForm,
}

impl H2hStat {
    pub const ALL: [H2hStat; 14] = [
        H2hStat::TotalMatches,
        H2hStat::HomeWins,
        H2hStat::AwayWins,
        H2hStat::Draws,
        H2hStat::HomeWinRate,
        H2hStat::AwayWinRate,
        H2hStat::DrawRate,
        H2hStat::HomeGoalsAvg,
        H2hStat::AwayGoalsAvg,
        H2hStat::TotalGoalsAvg,
        H2hStat::Dominance,
        H2hStat::RecentHomeWins,
        H2hStat::RecentHomeRate,
        H2hStat::RecentWeightedForm,
    ];

    fn name(self) -> &'static str {
        match self {
            H2hStat::TotalMatches => "h2h_total_matches",
            H2hStat::HomeWins => "h2h_home_wins",
            H2hStat::AwayWins => "h2h_away_wins",
            H2hStat::Draws => "h2h_draws",
            H2hStat::HomeWinRate => "h2h_home_win_rate",
            H2hStat::AwayWinRate => "h2h_away_win_rate",
            H2hStat::DrawRate => "h2h_draw_rate",
            H2hStat::HomeGoalsAvg => "h2h_home_goals_avg",
            H2hStat::AwayGoalsAvg => "h2h_away_goals_avg",
            H2hStat::TotalGoalsAvg => "h2h_total_goals_avg",
            H2hStat::Dominance => "h2h_dominance",
            H2hStat::RecentHomeWins => "h2h_recent_home_wins",
            H2hStat::RecentHomeRate => "h2h_recent_home_rate",
            H2hStat::RecentWeightedForm => "h2h_recent_weighted_form",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DerivedStat {
    DiffFormPoints5,
    DiffAttackStrength,
    DiffDefenseStrength,
    HomeAttackVsAwayDefense,
    AwayAttackVsHomeDefense,
    PositionAdvantage,
    HomeMomentum,
    AwayMomentum,
}

impl DerivedStat {
    pub const ALL: [DerivedStat; 8] = [
        DerivedStat::DiffFormPoints5,
        DerivedStat::DiffAttackStrength,
        DerivedStat::DiffDefenseStrength,
        DerivedStat::HomeAttackVsAwayDefense,
        DerivedStat::AwayAttackVsHomeDefense,
        DerivedStat::PositionAdvantage,
        DerivedStat::HomeMomentum,
        DerivedStat::AwayMomentum,
    ];

    fn name(self) -> &'static str {
        match self {
            DerivedStat::DiffFormPoints5 => "diff_form_points_5",
            DerivedStat::DiffAttackStrength => "diff_attack_strength",
            DerivedStat::DiffDefenseStrength => "diff_defense_strength",
            DerivedStat::HomeAttackVsAwayDefense => "home_attack_vs_away_defense",
            DerivedStat::AwayAttackVsHomeDefense => "away_attack_vs_home_defense",
            DerivedStat::PositionAdvantage => "position_advantage",
            DerivedStat::HomeMomentum => "home_momentum",
            DerivedStat::AwayMomentum => "away_momentum",
        }
    }

    /// Form windows the derivation reads from.
    pub fn required_windows(self) -> &'static [usize] {
        match self {
            DerivedStat::HomeMomentum | DerivedStat::AwayMomentum => &[5, 10],
            DerivedStat::PositionAdvantage => &[],
            _ => &[5],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    FormInsufficient(Side),
    StandingsMissing,
    H2hNoHistory,
}

impl Flag {
    pub const ALL: [Flag; 4] = [
        Flag::FormInsufficient(Side::Home),
        Flag::FormInsufficient(Side::Away),
        Flag::StandingsMissing,
        Flag::H2hNoHistory,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    Form {
        side: Side,
        stat: FormStat,
        window: usize,
    },
    Streak {
        side: Side,
        stat: StreakStat,
    },
    Venue {
        side: Side,
        stat: VenueStat,
    },
    Standing {
        side: Side,
        stat: StandingStat,
    },
    StandingDiff(DiffStat),
    H2h(H2hStat),
    Derived(DerivedStat),
    Flag(Flag),
}

impl Feature {
    pub fn name(&self) -> String {
        match self {
            Feature::Form { side, stat, window } => {
                format!("{}{}_{}", side.prefix(), stat.stem(), window)
            }
            Feature::Streak { side, stat } => format!("{}{}", side.prefix(), stat.stem()),
            Feature::Venue { side, stat } => format!("{}{}", side.prefix(), stat.stem()),
            Feature::Standing { side, stat } => format!("{}{}", side.prefix(), stat.stem()),
            Feature::StandingDiff(stat) => stat.name().to_string(),
            Feature::H2h(stat) => stat.name().to_string(),
            Feature::Derived(stat) => stat.name().to_string(),
            Feature::Flag(Flag::FormInsufficient(side)) => {
                format!("{}form_insufficient", side.prefix())
            }
            Feature::Flag(Flag::StandingsMissing) => "standings_missing".to_string(),
            Feature::Flag(Flag::H2hNoHistory) => "h2h_no_history".to_string(),
        }
    }

    /// Imputation default used when the feature could not be computed.
    pub fn default_value(&self) -> f64 {
        match self {
            Feature::Derived(DerivedStat::HomeMomentum | DerivedStat::AwayMomentum) => 1.0,
            _ => 0.0,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// The recognised feature set for one window configuration, in a fixed order.
#[derive(Debug, Clone)]
pub struct FeatureCatalog {
    windows: Vec<usize>,
    features: Vec<Feature>,
    by_name: HashMap<String, Feature>,
}

impl FeatureCatalog {
    pub fn new(windows: &[usize]) -> Self {
        let mut windows = windows.iter().copied().filter(|w| *w > 0).collect::<Vec<_>>();
        windows.sort_unstable();
        windows.dedup();

        let mut features = Vec::new();
        for side in Side::BOTH {
            for window in &windows {
                for stat in FormStat::ALL {
                    features.push(Feature::Form {
                        side,
                        stat,
                        window: *window,
                    });
                }
            }
            for stat in StreakStat::ALL {
                features.push(Feature::Streak { side, stat });
            }
            for stat in VenueStat::ALL {
                features.push(Feature::Venue { side, stat });
            }
        }
        for side in Side::BOTH {
            for stat in StandingStat::ALL {
                features.push(Feature::Standing { side, stat });
            }
        }
        features.extend(DiffStat::ALL.into_iter().map(Feature::StandingDiff));
        features.extend(H2hStat::ALL.into_iter().map(Feature::H2h));
        features.extend(
            DerivedStat::ALL
                .into_iter()
                .filter(|d| d.required_windows().iter().all(|w| windows.contains(w)))
                .map(Feature::Derived),
        );
        features.extend(Flag::ALL.into_iter().map(Feature::Flag));

        let by_name = features.iter().map(|f| (f.name(), *f)).collect();
        Self {
            windows,
            features,
            by_name,
        }
    }

    pub fn windows(&self) -> &[usize] {
        &self.windows
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(Feature::name).collect()
    }

    pub fn resolve(&self, name: &str) -> Option<Feature> {
        self.by_name.get(name.trim()).copied()
    }

    pub fn contains(&self, feature: &Feature) -> bool {
        self.by_name.contains_key(&feature.name())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Feature values for one fixture. Ordering is by key, never by insertion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    values: BTreeMap<Feature, f64>,
    imputed: BTreeSet<Feature>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-finite values are treated as missing and imputed.
    pub fn insert(&mut self, feature: Feature, value: f64) {
        if value.is_finite() {
            self.imputed.remove(&feature);
            self.values.insert(feature, value);
        } else {
            self.values.insert(feature, feature.default_value());
            self.imputed.insert(feature);
        }
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (Feature, f64)>) {
        for (feature, value) in entries {
            self.insert(feature, value);
        }
    }

    pub fn get(&self, feature: &Feature) -> Option<f64> {
        self.values.get(feature).copied()
    }

    pub fn get_named(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(k, _)| k.name() == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Feature, &f64)> {
        self.values.iter()
    }

    pub fn is_imputed(&self, feature: &Feature) -> bool {
        self.imputed.contains(feature)
    }

    pub fn imputed(&self) -> impl Iterator<Item = &Feature> {
        self.imputed.iter()
    }

    /// Fills every catalog feature the calculators did not produce. Returns how many were filled.
    pub fn impute(&mut self, catalog: &FeatureCatalog) -> usize {
        let mut filled = 0usize;
        for feature in catalog.features() {
            if !self.values.contains_key(feature) {
                self.values.insert(*feature, feature.default_value());
                self.imputed.insert(*feature);
                filled += 1;
            }
        }
        filled
    }

    /// Drops keys the catalog does not recognise. Returns the dropped keys.
    pub fn restrict_to(&mut self, catalog: &FeatureCatalog) -> Vec<Feature> {
        let dropped = self
            .values
            .keys()
            .filter(|k| !catalog.contains(k))
            .copied()
            .collect::<Vec<_>>();
        for key in &dropped {
            self.values.remove(key);
            self.imputed.remove(key);
        }
        dropped
    }

    pub fn named(&self) -> BTreeMap<String, f64> {
        self.values.iter().map(|(k, v)| (k.name(), *v)).collect()
    }
}

impl FromIterator<(Feature, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (Feature, f64)>>(iter: I) -> Self {
        let mut out = FeatureVector::new();
        out.extend(iter);
        out
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(&k.name(), v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_column_vocabulary() {
        let f = Feature::Form {
            side: Side::Home,
            stat: FormStat::PointsLast,
            window: 5,
        };
        assert_eq!(f.name(), "home_points_last_5");
        let f = Feature::Standing {
            side: Side::Away,
            stat: StandingStat::HomePpg,
        };
        assert_eq!(f.name(), "away_home_ppg");
        assert_eq!(Feature::StandingDiff(DiffStat::Position).name(), "diff_position");
        assert_eq!(
            Feature::Flag(Flag::FormInsufficient(Side::Away)).name(),
            "away_form_insufficient"
        );
    }

    #[test]
    fn catalog_names_are_unique_and_resolvable() {
        let catalog = FeatureCatalog::new(&[10, 3, 5, 5]);
        assert_eq!(catalog.windows(), &[3, 5, 10]);
        let names = catalog.names();
        let unique: BTreeSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        for feature in catalog.features() {
            assert_eq!(catalog.resolve(&feature.name()), Some(*feature));
        }
        assert_eq!(catalog.resolve("home_points_last_7"), None);
    }

    #[test]
    fn derived_features_need_their_windows() {
        let catalog = FeatureCatalog::new(&[3]);
        assert!(catalog.resolve("diff_form_points_5").is_none());
        assert!(catalog.resolve("home_momentum").is_none());
        assert!(catalog.resolve("position_advantage").is_some());
        let catalog = FeatureCatalog::new(&[5]);
        assert!(catalog.resolve("diff_form_points_5").is_some());
        assert!(catalog.resolve("home_momentum").is_none());
    }

    #[test]
    fn impute_fills_defaults_and_marks_them() {
        let catalog = FeatureCatalog::new(&[5, 10]);
        let mut v = FeatureVector::new();
        v.insert(Feature::H2h(H2hStat::Dominance), 0.4);
        let filled = v.impute(&catalog);
        assert_eq!(filled, catalog.len() - 1);
        assert_eq!(v.len(), catalog.len());
        assert!(!v.is_imputed(&Feature::H2h(H2hStat::Dominance)));
        assert_eq!(v.get_named("home_momentum"), Some(1.0));
        assert_eq!(v.get_named("diff_points"), Some(0.0));
        assert!(v.is_imputed(&Feature::StandingDiff(DiffStat::Points)));
    }

    #[test]
    fn non_finite_values_are_imputed() {
        let mut v = FeatureVector::new();
        let key = Feature::StandingDiff(DiffStat::Ppg);
        v.insert(key, f64::NAN);
        assert_eq!(v.get(&key), Some(0.0));
        assert!(v.is_imputed(&key));
    }

    #[test]
    fn serializes_as_named_map() {
        let v: FeatureVector = [
            (Feature::H2h(H2hStat::TotalMatches), 2.0),
            (Feature::StandingDiff(DiffStat::Points), -3.0),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"diff_points":-3.0,"h2h_total_matches":2.0}"#);
    }
}
