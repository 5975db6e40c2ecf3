//! THCの値から免疫状態を判定し、養殖池の管理方針を提示するモジュール

use std::fmt;

use serde::Serialize;

/// 低免疫の上限 (これ未満がLow) [cells/mL]
pub const LOW_THRESHOLD: f64 = 1.0e6;
/// 中程度の上限 (これ以下がModerate) [cells/mL]
pub const HIGH_THRESHOLD: f64 = 1.0e7;

/// 免疫状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmunityStatus {
    Low,
    Moderate,
    Good,
}

impl ImmunityStatus {
    /// cells/mL のTHCから免疫状態を判定します
    pub fn from_thc_per_ml(thc_per_ml: f64) -> Self {
        if thc_per_ml < LOW_THRESHOLD {
            Self::Low
        } else if thc_per_ml <= HIGH_THRESHOLD {
            Self::Moderate
        } else {
            Self::Good
        }
    }

    pub fn recommendation(self) -> &'static Recommendation {
        recommend(self)
    }
}

impl fmt::Display for ImmunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.recommendation().status)
    }
}

/// 管理方針
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    /// 状態を表す色付きの印
    pub marker: &'static str,
    pub status: &'static str,
    pub range: &'static str,
    pub water: &'static str,
    pub pond: &'static str,
    pub feeding: &'static str,
}

const STRESS_WATCH: &str =
    "Monitor parameters that stress shrimp, especially Vibrio counts, ammonia and nitrites.";
const DRAIN_FLUSH: &str = "Central drain flushing and disinfectant application advised.";

static TIERS: [(ImmunityStatus, Recommendation); 3] = [
    (
        ImmunityStatus::Low,
        Recommendation {
            marker: "🔴",
            status: "LOW IMMUNITY",
            range: "<1.0×10⁶ cells/mL",
            water: STRESS_WATCH,
            pond: DRAIN_FLUSH,
            feeding: "Immune stimulant feed coating at a minimum rate of 50%.",
        },
    ),
    (
        ImmunityStatus::Moderate,
        Recommendation {
            marker: "🟡",
            status: "MODERATE IMMUNITY",
            range: "1.0×10⁶ - 1.0×10⁷ cells/mL",
            water: STRESS_WATCH,
            pond: DRAIN_FLUSH,
            feeding: "Immune-enhance feed inclusion in the range of 25 to 50%.",
        },
    ),
    (
        ImmunityStatus::Good,
        Recommendation {
            marker: "🟢",
            status: "GOOD IMMUNITY",
            range: ">1.0×10⁷ cells/mL",
            water: "Maintain regular water monitoring.",
            pond: "Continue with current management.",
            feeding: "Continue with existing feeding unless unstable weather is forecasted or disease season is starting.",
        },
    ),
];

/// THCを左右する要因 (項目, 説明)
pub const KEY_FACTORS: [(&str, &str); 6] = [
    (
        "Stress levels",
        "High stress (poor water quality, crowding) reduces THC",
    ),
    (
        "Disease pressure",
        "Viral/bacterial infections trigger immune response",
    ),
    (
        "Nutrition",
        "Adequate nutrition supports immune cell production",
    ),
    (
        "Environmental conditions",
        "Temperature, salinity, dissolved oxygen",
    ),
    ("Feed quality", "Immune-stimulating ingredients boost THC"),
    (
        "Sampling timing",
        "THC varies throughout the day and season",
    ),
];

/// 継続的な計測の進め方 (項目, 説明)
pub const MONITORING: [(&str, &str); 6] = [
    ("Frequency", "Sample every 5-7 days during production cycle"),
    ("Trend analysis", "Monitor THC trends, not just single values"),
    (
        "Multiple shrimp",
        "Sample at least 5-10 shrimp per pond for accuracy",
    ),
    (
        "Consistent timing",
        "Sample at same time each day for consistency",
    ),
    ("Record keeping", "Document results for management decisions"),
    (
        "Weather awareness",
        "Increase monitoring during weather changes",
    ),
];

/// 免疫状態に対応する管理方針を返します
pub fn recommend(status: ImmunityStatus) -> &'static Recommendation {
    match status {
        ImmunityStatus::Low => &TIERS[0].1,
        ImmunityStatus::Moderate => &TIERS[1].1,
        ImmunityStatus::Good => &TIERS[2].1,
    }
}

/// すべての区分を低い順に返します
pub fn all_tiers() -> impl Iterator<Item = (ImmunityStatus, &'static Recommendation)> {
    TIERS.iter().map(|(s, r)| (*s, r))
}
