pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// `1 - e^(-amount/sat)`, or `fallback` when the saturation is not positive.
pub fn saturate(amount: f64, sat: f64, fallback: f64) -> f64 {
    if sat > 0.0 {
        1.0 - (-amount / sat).exp()
    } else {
        fallback
    }
}

/// Instant popularity: share of booked slots, scaled by how much absolute
/// bell volume backs it.
pub fn score_v2(bell: u32, maru: u32, tel: u32, bell_sat: f64) -> f64 {
    let denom = bell + maru + tel;
    let fill = if denom > 0 {
        f64::from(bell) / f64::from(denom)
    } else {
        0.0
    };
    let strength = saturate(f64::from(bell), bell_sat, 0.0);
    clamp01(fill * strength)
}

/// Wilson score interval lower bound for `successes` out of `total`.
/// Both may be fractional (decayed sums).
pub fn wilson_lower_bound(successes: f64, total: f64, z: f64) -> f64 {
    if total <= 0.0 || z <= 0.0 {
        return 0.0;
    }
    let z2 = z * z;
    let phat = successes / total;
    let denom = 1.0 + z2 / total;
    let center = phat + z2 / (2.0 * total);
    let margin = z * ((phat * (1.0 - phat) + z2 / (4.0 * total)) / total).sqrt();
    clamp01((center - margin) / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_and_unbooked_score_zero() {
        assert_eq!(score_v2(0, 0, 0, 18.0), 0.0);
        assert_eq!(score_v2(0, 12, 3, 18.0), 0.0);
        assert_eq!(score_v2(5, 0, 0, 0.0), 0.0);
    }

    #[test]
    fn volume_separates_fully_booked_items() {
        let few = score_v2(2, 0, 0, 18.0);
        let many = score_v2(40, 0, 0, 18.0);
        assert!(few < many);
        assert!((many - (1.0 - (-40.0f64 / 18.0).exp())).abs() < 1e-12);
    }

    #[test]
    fn wilson_examples() {
        assert_eq!(wilson_lower_bound(0.0, 0.0, 1.96), 0.0);
        let small = wilson_lower_bound(3.0, 4.0, 1.96);
        let large = wilson_lower_bound(75.0, 100.0, 1.96);
        assert!(small < large);
        assert!(large < 0.75);
    }

    proptest! {
        #[test]
        fn score_in_unit_range(bell in 0u32..500, maru in 0u32..500, tel in 0u32..500, sat in 0.0f64..100.0) {
            let s = score_v2(bell, maru, tel, sat);
            prop_assert!((0.0..=1.0).contains(&s));
        }

        #[test]
        fn score_monotone_in_bell(bell in 0u32..400, open in 0u32..400, maru_share in 0u32..=100) {
            let maru = open * maru_share / 100;
            let tel = open - maru;
            let lo = score_v2(bell, maru, tel, 18.0);
            let hi = score_v2(bell + 1, maru, tel, 18.0);
            prop_assert!(hi >= lo);
        }

        #[test]
        fn wilson_never_exceeds_ratio(success in 0.0f64..200.0, extra in 0.0f64..200.0, z in 0.1f64..4.0) {
            let total = success + extra;
            prop_assume!(total > 0.0);
            let lb = wilson_lower_bound(success, total, z);
            prop_assert!(lb <= success / total + 1e-9);
        }
    }
}
