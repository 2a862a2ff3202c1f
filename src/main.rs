use dc_core::host::NullHost;
use dc_core::{Machine, MachineConfig};
use log::info;
use std::fs;

fn load_config(path: Option<&str>) -> MachineConfig {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path).expect("could not read config file");
            MachineConfig::from_toml_str(&text).expect("invalid config file")
        }
        None => MachineConfig::default(),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config = load_config(args.get(1).map(String::as_str));
    env_logger::Builder::new().parse_filters(&config.log_filter).init();

    let machine = Machine::new(&config, Box::new(NullHost::default()));
    let mut machine = match machine {
        Ok(m) => m,
        Err(e) => {
            dc_core::fatal!("failed to construct machine: {}", e);
        }
    };

    info!("running headless; no host callbacks are wired up (see SPEC_FULL.md §1/§6.1)");
    for _ in 0..60 {
        machine.tick(16_666_667);
    }
}
