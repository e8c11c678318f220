use log::{error, info, warn};
use sparse_conformance::{
    CpuSparse, DenseOracle, Error, GpuSubject, Harness, HarnessConfig, SweepReport, SweepSpec,
};
use std::process::ExitCode;
use std::time::Instant;

fn print_failures(report: &SweepReport) {
    for failure in report.failures() {
        println!("FAIL {}", failure);
    }
    println!("{}", report);
}

async fn run() -> Result<bool, Error> {
    env_logger::init();
    let config = HarnessConfig::from_env()?;
    info!("seed {:#x}, parallel {}", config.seed, config.parallel);
    let spec = SweepSpec::full();

    let now = Instant::now();
    let harness = Harness::with_config(DenseOracle::new(), CpuSparse::new(), config.clone());
    let cpu_report = harness.sweep(&spec);
    info!("cpu sweep: {:?}", now.elapsed());
    print_failures(&cpu_report);
    let mut ok = cpu_report.failed() == 0;

    match GpuSubject::new().await {
        Ok(gpu) => {
            info!("adapter: {}", gpu.adapter_name());
            // One queue, so device cases run serially
            let harness = Harness::with_config(DenseOracle::new(), gpu, config.serial());
            let now = Instant::now();
            let gpu_report = harness.sweep(&spec);
            info!("gpu sweep: {:?}", now.elapsed());
            print_failures(&gpu_report);
            ok &= gpu_report.failed() == 0;
        }
        Err(Error::NoAdapter) => warn!("no GPU adapter, skipping device sweep"),
        Err(err) => return Err(err),
    }
    Ok(ok)
}

fn main() -> ExitCode {
    match pollster::block_on(run()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
