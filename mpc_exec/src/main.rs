//! # MPC Executable
//!
//! This executable drives the simulator with the model predictive controller. The simulator's
//! socket.io text frames are read one per line on stdin, and the reply frames are written one
//! per line on stdout. Logs go to stderr and the session log file.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{debug, info, warn};
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

// Internal
use comms_if::sim::{manual_frame, SimEvent, SteerDems, Telemetry};
use mpc_lib::{
    mpc_ctrl::{CycleRecord, InputData, MpcCtrl, OutputData, Params as MpcCtrlParams},
    reference::Pose2,
    vehicle_model::Actuation,
};
use params::{FallbackMode, MpcExecParams};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    maths::lin_map,
    module::State,
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "mpc_exec", about = "Drive the simulator with the MPC controller")]
struct Args {
    /// Executable parameter file, relative to the params directory
    #[structopt(short, long, default_value = "mpc_exec.toml")]
    params: String,

    /// Minimum level of log messages, one of info, debug or trace. Quieter
    /// levels are rejected by the logger.
    #[structopt(short, long, default_value = "debug")]
    log_level: LevelFilter,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("mpc_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(args.log_level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MPC Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: MpcExecParams = util::params::load(&args.params)
        .wrap_err("Could not load mpc_exec params")?;
    debug!("Executable parameters: {:#?}", exec_params);

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut mpc_ctrl = MpcCtrl::from_params_file(&exec_params.mpc_ctrl_params_file)
        .wrap_err("Failed to initialise MpcCtrl")?;
    info!("MpcCtrl init complete");

    let mut archiver = Archiver::from_path(&session, "mpc_exec_cycles.csv")
        .wrap_err("Failed to create the cycle archive")?;

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let reply_delay = Duration::from_millis(exec_params.reply_delay_ms);
    let mut last_dems = SteerDems::default();
    let mut num_cycles = 0usize;
    let mut num_failures = 0usize;

    let stdin = io::stdin();
    let stdout = io::stdout();

    for line in stdin.lock().lines() {
        let frame = line.wrap_err("Failed to read a frame from stdin")?;

        let event = match SimEvent::from_frame(&frame) {
            Ok(Some(e)) => e,
            Ok(None) => continue,
            Err(e) => {
                warn!("Discarding frame: {}", e);
                continue;
            }
        };

        let reply = match event {
            SimEvent::Manual => manual_frame(),
            SimEvent::Telemetry(telem) => {
                num_cycles += 1;

                let dems = match control_cycle(&mut mpc_ctrl, &telem, &mut archiver) {
                    Some(out) => build_dems(mpc_ctrl.params(), &out),
                    None => {
                        num_failures += 1;
                        fallback_dems(&exec_params, &last_dems)
                    }
                };
                last_dems = dems.clone();

                // The vehicle would not act on the demands immediately
                thread::sleep(reply_delay);

                dems.to_frame()
                    .wrap_err("Failed to serialise the steering demands")?
            }
        };

        let mut out = stdout.lock();
        writeln!(out, "{}", reply).wrap_err("Failed to write the reply frame")?;
        out.flush().wrap_err("Failed to flush stdout")?;
    }

    info!("End of input reached, stopping");
    info!("{} control cycles run, {} failed", num_cycles, num_failures);

    session.exit();

    Ok(())
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Run one control cycle on the given telemetry, returning `None` if no demands could be
/// computed.
fn control_cycle(
    mpc_ctrl: &mut MpcCtrl,
    telem: &Telemetry,
    archiver: &mut Archiver
) -> Option<OutputData> {
    let pose = Pose2 {
        x_m: telem.x,
        y_m: telem.y,
        psi_rad: telem.psi,
    };
    let prev_act = Actuation {
        steer_rad: telem.steering_angle,
        throttle: telem.throttle,
    };

    let input = match InputData::from_world(
        &pose,
        telem.speed,
        &telem.ptsx,
        &telem.ptsy,
        Some(prev_act)
    ) {
        Ok(i) => i,
        Err(e) => {
            warn!("Could not build MpcCtrl input: {}", e);
            return None;
        }
    };

    let result = mpc_ctrl.proc(&input);

    let record = CycleRecord::new(session::get_elapsed_seconds(), &input, &result);
    if let Err(e) = archiver.serialise(record) {
        warn!("Could not archive the cycle: {}", e);
    }

    match result {
        Ok((output, _)) => Some(output),
        Err(e) => {
            warn!("MpcCtrl processing failed: {}", e);
            None
        }
    }
}

/// Convert the controller output into demands for the simulator.
fn build_dems(params: &MpcCtrlParams, output: &OutputData) -> SteerDems {
    SteerDems {
        steering_angle: lin_map(
            (-params.max_steer_rad, params.max_steer_rad),
            (-1.0, 1.0),
            output.act.steer_rad
        ),
        throttle: output.act.throttle,
        mpc_x: output.predicted_x_m.clone(),
        mpc_y: output.predicted_y_m.clone(),
        next_x: output.reference_x_m.clone(),
        next_y: output.reference_y_m.clone(),
    }
}

/// Demands to send when a cycle fails. Trajectories are cleared since there is no prediction to
/// display.
fn fallback_dems(params: &MpcExecParams, last_dems: &SteerDems) -> SteerDems {
    let throttle = match params.fallback {
        FallbackMode::HoldPrevious => last_dems.throttle,
        FallbackMode::Brake => params.brake_throttle,
    };

    SteerDems {
        steering_angle: last_dems.steering_angle,
        throttle,
        ..Default::default()
    }
}
