/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
// This crate will be called XiPalette whether Rust likes it or not.
#![allow(non_snake_case)]

use libXiPalette::sysex::roland::DeviceId;
use libXiPalette::transfer::kinds::{AnalogTone, ProgramEffects, VocalEffect};
use libXiPalette::transfer::{DumpKind, PatchManager, Settings};
use libXiPalette::transport::loopback::LoopbackBackend;
use libXiPalette::ui::{list_sysex_messages, StderrTableStream};

use std::error::Error;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

const USAGE: &str = "\
XiPalette by hikari_no_yume

Usage:

    XiPalette inspect patch.syx [-v]
    XiPalette init <analog|effects|vocal-effect> [-o patch.syx] [-d id] [-v]

Commands:

    inspect <path>
        Lists the SysEx messages in a .syx file, with what they mean to a
        JD-Xi and whether it would accept them.

    init <kind>
        Produces the data set messages for a JD-Xi patch with every
        parameter at its initial value. Without -o, the messages are listed
        instead.

Options:

    -h
    --help
        Print this help text.

    -o <path>
        Writes the messages to <path>.

    -d <id>
        Device ID in hex, 10 to 1F. The default is 10.

    -v
        Verbose mode.
";

enum Command {
    Inspect,
    Init,
}

fn parse_device_id(arg: &OsString) -> Result<DeviceId, Box<dyn Error>> {
    let text = arg.to_str().ok_or("Device ID is not valid text")?;
    let text = text.trim_end_matches(['h', 'H']);
    match u8::from_str_radix(text, 16) {
        Ok(id @ 0x10..=0x1F) => Ok(id),
        _ => Err(format!("Device ID must be 10 to 1F, not {:?}", arg).into()),
    }
}

/// Runs a dump of the initial patch into an in-memory port and collects what
/// would have been sent.
fn init_messages<K: DumpKind>(settings: Settings) -> Result<Vec<u8>, Box<dyn Error>>
where
    K::Patch: Default,
{
    let backend = Arc::new(LoopbackBackend::new(1));
    let manager = PatchManager::<K>::with_settings(backend.clone(), settings);
    manager.dump(&K::Patch::default(), 0)?;
    Ok(backend
        .take_sent()
        .into_iter()
        .flat_map(|(_port, message)| message)
        .collect())
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args_os();
    let _ = args.next(); // ignore argv[0]

    let mut command = None;
    let mut operand = None;
    let mut out_path = None;
    let mut device_id = None;
    let mut verbose = false;
    while let Some(arg) = args.next() {
        if arg == "-h" || arg == "--help" {
            eprintln!("{}", USAGE);
            return Ok(());
        } else if arg == "-o" {
            if out_path.is_some() {
                return Err("Only one output path can be specified".into());
            }
            out_path = args.next().map(PathBuf::from);
            if out_path.is_none() {
                return Err("Missing output path after -o".into());
            }
        } else if arg == "-d" {
            let Some(id) = args.next() else {
                return Err("Missing device ID after -d".into());
            };
            device_id = Some(parse_device_id(&id)?);
        } else if arg == "-v" {
            verbose = true;
        } else if command.is_none() {
            command = Some(if arg == "inspect" {
                Command::Inspect
            } else if arg == "init" {
                Command::Init
            } else {
                eprintln!("{}", USAGE);
                return Err(format!("Unknown command: {:?}", arg).into());
            });
        } else if operand.is_none() {
            operand = Some(arg);
        } else {
            eprintln!("{}", USAGE);
            return Err(format!("Unexpected argument: {:?}", arg).into());
        }
    }

    colog::default_builder()
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let Some(command) = command else {
        eprintln!("{}", USAGE);
        return Err("No command specified".into());
    };
    let Some(operand) = operand else {
        eprintln!("{}", USAGE);
        return Err("Missing argument after the command".into());
    };

    match command {
        Command::Inspect => {
            if out_path.is_some() || device_id.is_some() {
                return Err("-o and -d only apply to init".into());
            }
            let in_path = PathBuf::from(operand);
            let stream = std::fs::read(&in_path)?;
            log::debug!("Read {} bytes from {:?}", stream.len(), in_path);
            list_sysex_messages(&mut StderrTableStream::new(), &stream);
        }
        Command::Init => {
            let mut settings = Settings::default();
            if let Some(device_id) = device_id {
                settings.device_id = device_id;
            }
            let messages = if operand == "analog" {
                init_messages::<AnalogTone>(settings)?
            } else if operand == "effects" {
                init_messages::<ProgramEffects>(settings)?
            } else if operand == "vocal-effect" {
                init_messages::<VocalEffect>(settings)?
            } else {
                return Err(format!("Unknown patch kind: {:?}", operand).into());
            };

            match out_path {
                Some(out_path) => {
                    std::fs::write(&out_path, &messages)?;
                    log::info!("Wrote {} bytes to {:?}", messages.len(), out_path);
                }
                None => list_sysex_messages(&mut StderrTableStream::new(), &messages),
            }
        }
    }

    Ok(())
}
