//! Cyclic module interface
//!
//! Controllers in this workspace are driven one cycle at a time by an
//! executable: `mpc_exec` calls `proc` once per telemetry frame and
//! `sim_test` once per simulated control period. Implementing `State` lets
//! both drive a module the same way and lets a module be swapped for a test
//! double without touching the loop.

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// A module that is set up once and then processes one input per cycle.
///
/// `init` takes everything fixed for the life of the module, usually its
/// parameters. `proc` takes what changes from cycle to cycle and returns the
/// cycle's result alongside a report describing how it was produced. Any
/// data carried between cycles lives in the implementor.
pub trait State: Sized {
    /// Usually the module's parameters
    type InitData;
    type InitError;

    /// Measurements for one cycle
    type InputData;
    /// Demands produced by one cycle
    type OutputData;
    /// Diagnostics for one cycle, for logging and archiving
    type StatusReport;
    type ProcError;

    fn init(init_data: Self::InitData) -> Result<Self, Self::InitError>;

    /// Run one cycle.
    ///
    /// A failed cycle must leave the module usable for the next one.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}

#[cfg(test)]
mod test {
    use super::*;

    /// Integrates its input and fails on negative values.
    struct Integrator {
        gain: f64,
        total: f64,
    }

    impl State for Integrator {
        type InitData = f64;
        type InitError = String;
        type InputData = f64;
        type OutputData = f64;
        type StatusReport = usize;
        type ProcError = String;

        fn init(gain: f64) -> Result<Self, String> {
            if gain <= 0.0 {
                return Err(format!("Gain must be positive, got {}", gain));
            }
            Ok(Self { gain, total: 0.0 })
        }

        fn proc(&mut self, input: &f64) -> Result<(f64, usize), String> {
            if *input < 0.0 {
                return Err(String::from("Negative input"));
            }
            self.total += self.gain * input;
            Ok((self.total, 1))
        }
    }

    /// Drive any module over a sequence of inputs, as the executables do.
    fn run<S: State>(
        module: &mut S,
        inputs: &[S::InputData]
    ) -> Vec<Result<S::OutputData, S::ProcError>> {
        inputs
            .iter()
            .map(|i| module.proc(i).map(|(out, _)| out))
            .collect()
    }

    #[test]
    fn test_cycles_carry_state() {
        assert!(Integrator::init(0.0).is_err());

        let mut module = Integrator::init(2.0).unwrap();
        let outputs = run(&mut module, &[1.0, -1.0, 0.5]);

        assert_eq!(outputs[0], Ok(2.0));
        assert!(outputs[1].is_err());

        // The failed cycle did not disturb the next one
        assert_eq!(outputs[2], Ok(3.0));
    }
}
