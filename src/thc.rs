//! THC (Total Hemocyte Count) の計算モジュール
//!
//! 40倍対物レンズで観察したノイバウエル血球計算盤の1視野に含まれる体積 (約0.014μL)
//! から、1μLあたりの血球数に換算します。

use anyhow::{ensure, Result};
use serde::Serialize;

/// 1視野の体積 [μL] (目安)
pub const DEFAULT_FIELD_VOLUME_UL: f64 = 0.014;

/// 1視野あたりの換算係数 (≒ 1 / 0.014μL)
///
/// 区分の境界付近の判定を変えないよう、`1. / DEFAULT_FIELD_VOLUME_UL` ではなくこの値を使います。
pub const DEFAULT_FIELD_FACTOR: f64 = 71.42857142857;

/// 希釈倍率の範囲
pub const DILUTION_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// THCの計算結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThcResult {
    /// 検出された血球数
    pub count: usize,
    /// 希釈倍率
    pub dilution_factor: u32,
    /// cells/μL
    pub per_ul: f64,
    /// cells/mL
    pub per_ml: f64,
}

/// 換算係数を返します。体積の指定がなければ `DEFAULT_FIELD_FACTOR` です。
pub fn field_factor(field_volume_ul: Option<f64>) -> Result<f64> {
    match field_volume_ul {
        None => Ok(DEFAULT_FIELD_FACTOR),
        Some(v) => {
            ensure!(
                v.is_finite() && v > 0.,
                "field volume must be a positive number of microliters, got {}",
                v
            );
            Ok(1. / v)
        }
    }
}

/// THCを計算します
///
/// `THC (cells/μL) = 血球数 × 希釈倍率 × 換算係数`,
/// `THC (cells/mL) = THC (cells/μL) × 1000`
///
/// # Args
/// * `count` - 検出された血球数
/// * `dilution_factor` - 希釈倍率 (1 = 希釈なし)
/// * `field_volume_ul` - 1視野の体積 [μL] (Noneなら既定の換算係数)
pub fn calculate_thc(
    count: usize,
    dilution_factor: u32,
    field_volume_ul: Option<f64>,
) -> Result<ThcResult> {
    ensure!(
        DILUTION_RANGE.contains(&dilution_factor),
        "dilution factor must be between {} and {}, got {}",
        DILUTION_RANGE.start(),
        DILUTION_RANGE.end(),
        dilution_factor
    );
    let per_ul = count as f64 * dilution_factor as f64 * field_factor(field_volume_ul)?;
    Ok(ThcResult {
        count,
        dilution_factor,
        per_ul,
        per_ml: per_ul * 1000.,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::ImmunityStatus;

    fn close(a: f64, b: f64) -> bool {
        ((a - b) / b.max(1.)).abs() < 1e-9
    }

    #[test]
    fn ten_cells_undiluted() {
        let r = calculate_thc(10, 1, None).unwrap();
        assert_eq!(r.per_ul, 10. * DEFAULT_FIELD_FACTOR);
        assert!(close(r.per_ml, 714_285.714_285_7));
    }

    #[test]
    fn fourteen_cells_stay_below_moderate() {
        let r = calculate_thc(14, 1, None).unwrap();
        assert!(r.per_ml < 1.0e6);
        assert_eq!(ImmunityStatus::from_thc_per_ml(r.per_ml), ImmunityStatus::Low);

        let r = calculate_thc(7, 2, None).unwrap();
        assert_eq!(ImmunityStatus::from_thc_per_ml(r.per_ml), ImmunityStatus::Low);
    }

    #[test]
    fn explicit_field_volume_is_inverted() {
        let r = calculate_thc(5, 1, Some(0.02)).unwrap();
        assert!(close(r.per_ul, 250.));
    }

    #[test]
    fn dilution_scales_linearly() {
        let a = calculate_thc(25, 1, None).unwrap();
        let b = calculate_thc(25, 5, None).unwrap();
        assert!(close(b.per_ml, a.per_ml * 5.));
    }

    #[test]
    fn zero_count_is_zero() {
        let r = calculate_thc(0, 3, None).unwrap();
        assert_eq!(r.per_ul, 0.);
        assert_eq!(r.per_ml, 0.);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(calculate_thc(1, 0, None).is_err());
        assert!(calculate_thc(1, 11, None).is_err());
        assert!(calculate_thc(1, 1, Some(0.)).is_err());
        assert!(calculate_thc(1, 1, Some(f64::NAN)).is_err());
    }
}
