use crate::error::*;

/// Uniform sampling of the simulated time interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeAxis {
    start: f64,
    stop: f64,
    step: f64,
    num: usize,
}

impl TimeAxis {
    /// Number of samples is `ceil((stop - start + step) / step)`,
    /// `stop` is moved to the last sample.
    pub fn new(start: f64, stop: f64, step: f64) -> Result<Self> {
        if !(step > 0.0) || !step.is_finite() {
            return Err(Error::InvalidTimeAxis(format!(
                "step must be positive, got {step}"
            )));
        }
        if !start.is_finite() || !stop.is_finite() || stop < start {
            return Err(Error::InvalidTimeAxis(format!(
                "interval [{start}, {stop}] is empty or not finite"
            )));
        }
        let num = ((stop - start + step) / step).ceil() as usize;
        Self::from_num(start, step, num)
    }

    pub fn from_num(start: f64, step: f64, num: usize) -> Result<Self> {
        if num < 2 {
            return Err(Error::InvalidTimeAxis(format!(
                "at least two samples are needed, got {num}"
            )));
        }
        Ok(TimeAxis {
            start,
            stop: start + step * (num - 1) as f64,
            step,
            num,
        })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn time_values(&self) -> Vec<f64> {
        (0..self.num)
            .map(|i| self.start + self.step * i as f64)
            .collect()
    }
}

impl std::fmt::Display for TimeAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TimeAxis: start={}, stop={}, step={}, num={}",
            self.start, self.stop, self.step, self.num
        )
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn script_axis_test() {
        let axis = TimeAxis::new(0.0, 250.0, 1.0).unwrap();
        assert_eq!(axis.num(), 251);
        assert_approx_eq!(f64, axis.stop(), 250.0);
        let values = axis.time_values();
        assert_eq!(values.len(), 251);
        assert_approx_eq!(f64, values[100], 100.0);
    }

    #[test]
    fn stop_is_recomputed_test() {
        let axis = TimeAxis::new(0.0, 10.0, 3.0).unwrap();
        assert_eq!(axis.num(), 5);
        assert_approx_eq!(f64, axis.stop(), 12.0);
    }

    #[test]
    fn reject_test() {
        assert!(TimeAxis::new(0.0, 10.0, 0.0).is_err());
        assert!(TimeAxis::new(5.0, 1.0, 1.0).is_err());
        assert!(TimeAxis::new(0.0, 0.0, 1.0).is_err());
    }
}
