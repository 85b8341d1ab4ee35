use crate::model::mean;

const BETA_MAX_ITERATIONS: usize = 300;
const BETA_EPSILON: f64 = 3.0e-14;
const BETA_FLOOR: f64 = 1.0e-300;

/// One-sample Student's t-test: returns `(t, two-sided p)`.
///
/// Fewer than two samples gives NaN. With zero sample variance the statistic is
/// NaN when the mean equals `popmean` and infinite (p = 0) otherwise.
pub(super) fn one_sample_t_test(samples: &[f64], popmean: f64) -> (f64, f64) {
    let n = samples.len();
    if n < 2 || popmean.is_nan() || samples.iter().any(|value| value.is_nan()) {
        return (f64::NAN, f64::NAN);
    }

    let sample_mean = mean(samples);
    let variance = samples
        .iter()
        .map(|value| (value - sample_mean).powi(2))
        .sum::<f64>()
        / (n - 1) as f64;
    let standard_error = (variance / n as f64).sqrt();
    let difference = sample_mean - popmean;

    if standard_error == 0.0 {
        if difference == 0.0 {
            return (f64::NAN, f64::NAN);
        }
        return (f64::INFINITY.copysign(difference), 0.0);
    }

    let t = difference / standard_error;
    (t, student_t_two_sided_p(t, (n - 1) as f64))
}

/// Two-sided tail probability of Student's t with `df` degrees of freedom.
pub(super) fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0_f64;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < BETA_FLOOR {
        d = BETA_FLOOR;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=BETA_MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < BETA_FLOOR {
            d = BETA_FLOOR;
        }
        c = 1.0 + aa / c;
        if c.abs() < BETA_FLOOR {
            c = BETA_FLOOR;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < BETA_FLOOR {
            d = BETA_FLOOR;
        }
        c = 1.0 + aa / c;
        if c.abs() < BETA_FLOOR {
            c = BETA_FLOOR;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < BETA_EPSILON {
            break;
        }
    }

    h
}

// Lanczos approximation (g = 7, n = 9).
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut series = COEFFICIENTS[0];
    for (index, coefficient) in COEFFICIENTS.iter().enumerate().skip(1) {
        series += coefficient / (x + index as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}
