use super::datapath::Datapath;
use super::flow::FlowEntry;
use super::flowspec;
use super::rawsocket::RawSocket;
use super::rconn::Rconn;
use super::vconn;

use std::env;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::process;
use std::thread::sleep;
use std::time::{Duration, Instant};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use serde::Serialize;
use serde::Deserialize;
use signal_hook::consts::signal::*;
use signal_hook::flag as signal_flag;


// Le daemon

pub fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        println!("Invalid number of arguments.");
        print_usage(&args[0]);
        process::exit(1);
    }
    let specpath = &args[1];

    let spec = match try_read_switch_spec(specpath) {
        Some(spec) => spec,
        None => process::exit(1)
    };
    let mut dp = match build_datapath(&spec) {
        Ok(dp) => dp,
        Err(error) => {
            println!("Failed to bring up the switch ({})", error);
            process::exit(1);
        }
    };
    install_flows(&mut dp, &spec, 0);

    let stop = signals_received(&[SIGINT, SIGTERM]);
    let reload = signals_received(&[SIGHUP]);
    let epoch = Instant::now();
    loop {
        let now = epoch.elapsed().as_secs();
        dp.run(now);
        if stop() {
            break;
        }
        if reload() {
            // Re-read the spec and reinstall its static flows. Ports and
            // connections stay as they are.
            if let Some(spec) = try_read_switch_spec(specpath) {
                install_flows(&mut dp, &spec, now);
            }
        }
        pace(&dp);
    }
    dp.report();
}

fn print_usage(exe: &str) {
    println!("Usage: {} <specpath>", exe);
    let spec = SwitchSpec {
        datapath_id: Some(0x00_00_12_34_56_78),
        controller: "tcp:127.0.0.1:6633".to_string(),
        listen: Some("tcp:127.0.0.1:6634".to_string()),
        ports: vec!["eth1".to_string(), "eth2".to_string()],
        flows: vec![
            "dl_type=0x0806,actions=flood".to_string(),
            "priority=10,dl_type=0x0800,nw_proto=6,tp_dst=80,\
             actions=output:2".to_string()
        ]
    };
    println!("Example config for <specpath>: {}",
             serde_json::to_string(&spec).unwrap());
}


// This is the switch spec / configuration format

#[derive(Serialize,Deserialize)]
struct SwitchSpec {
    datapath_id: Option<u64>,
    controller: String,
    listen: Option<String>,
    ports: Vec<String>,
    flows: Vec<String>
}


// Parse a switch spec from a JSON file

fn read_switch_spec(path: &str) -> Result<SwitchSpec, Box<dyn Error>> {
    let file = File::open(path)?;
    let spec = serde_json::from_reader(BufReader::new(file))?;
    Ok(spec)
}

fn try_read_switch_spec(path: &str) -> Option<SwitchSpec> {
    match read_switch_spec(path) {
        Ok(spec) => Some(spec),
        Err(error) => {
            println!("Warning: failed to read {} ({})", path, error);
            None
        }
    }
}


// Realize the spec: datapath id, controller connection, ports, listener

fn build_datapath(spec: &SwitchSpec) -> Result<Datapath, Box<dyn Error>> {
    let id = match spec.datapath_id {
        Some(id) if id <= 0xffff_ffff_ffff => id,
        _ => gen_datapath_id()
    };
    let mut dp = Datapath::new(id, Rconn::connect(&spec.controller));
    for ifname in &spec.ports {
        let dev = RawSocket::open(ifname)?;
        let port_no = dp.add_port(Box::new(dev))?;
        println!("port {}: {}", port_no, ifname);
    }
    if let Some(endpoint) = &spec.listen {
        dp.add_listener(vconn::listen(endpoint)?);
    }
    Ok(dp)
}

// A datapath id is the size of a hardware address; without a configured one,
// draw it at random.
fn gen_datapath_id() -> u64 {
    rand::thread_rng().gen::<u64>() & 0xffff_ffff_ffff
}

fn install_flows(dp: &mut Datapath, spec: &SwitchSpec, now: u64) {
    for s in &spec.flows {
        match flowspec::parse(s) {
            Ok(f) => {
                let entry = FlowEntry::new(f.key, f.priority, f.idle_timeout,
                                           f.hard_timeout, now, f.actions);
                if dp.chain.insert(entry).is_err() {
                    println!("Warning: tables full, flow not installed: {}", s);
                }
            }
            Err(error) => {
                println!("Warning: bad flow spec {} ({})", s, error);
            }
        }
    }
}


// Idle pacing: scale the sleep between passes from nothing up to MAXSLEEP
// microseconds. A pass that moved packets halves the sleep; an idle pass
// lengthens it by one microsecond.

const MAXSLEEP: u64 = 100;

static mut LASTWORK: u64 = 0;
static mut SLEEP: u64 = 0;

fn pace(dp: &Datapath) {
    let work = dp.stats.rx_packets + dp.stats.tx_packets
        + dp.stats.packet_ins;
    unsafe {
        if LASTWORK == work {
            SLEEP = std::cmp::min(SLEEP + 1, MAXSLEEP);
            sleep(Duration::from_micros(SLEEP));
        } else {
            SLEEP /= 2;
        }
        LASTWORK = work;
    }
}


// Signal handling (for catching SIGINT/SIGTERM and SIGHUP)

// See https://docs.rs/signal-hook/0.3.6/signal_hook/flag/index.html#examples
// “Reloading a configuration on SIGHUP (which is a common behaviour of many
// UNIX daemons, together with reopening the log file).”
fn signals_received(signals: &[i32]) -> Box<dyn Fn() -> bool> {
    let flag = Arc::new(AtomicBool::new(false));
    for &signal in signals {
        signal_flag::register(signal, Arc::clone(&flag))
            .expect("Cannot register signal handler");
    }
    // Return a closure () -> bool that returns true whenever we
    // receive one of `signals'
    Box::new(move || flag.swap(false, Ordering::Relaxed))
}
