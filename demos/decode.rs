use std::{env, sync::Arc};

use modbus_frame_decoder::{
    decoder::{ChecksumPolicy, FrameDecoder},
    parser::FrameParser,
    protocol::ProtocolDescriptor,
    registers::RegisterAddress,
    store::VariableStore,
};
use tracing_subscriber::EnvFilter;

// Current is reported to the device in milliamps.
const PROTOCOL: &str = r#"{
    "function_codes": {
        "3": "Read Holding Registers",
        "4": "Read Input Registers",
        "6": "Write Single Register"
    },
    "registers": {
        "0x1000": {
            "name": "Voltage",
            "description": "Grid voltage",
            "variable_mapping": { "name": "voltage" }
        },
        "0x1001": {
            "name": "Current",
            "description": "Output current (mA)",
            "variable_mapping": {
                "name": "current",
                "conversion": { "read": "value * 1000", "write": "value / 1000" }
            }
        },
        "0x1002": {
            "name": "Power",
            "description": "Active power",
            "variable_mapping": { "name": "power" }
        },
        "0x1010": { "name": "Status", "description": "Device status word" }
    }
}"#;

// Used when no frames are given on the command line.
const SAMPLE_FRAMES: [&str; 4] = [
    "0103100000010000",
    "0104101000020000",
    "0110200000010000",
    "0103",
];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let protocol = match ProtocolDescriptor::from_json(PROTOCOL) {
        Ok(protocol) => protocol,
        Err(err) => {
            eprintln!("Invalid protocol document: {err}");
            return;
        }
    };

    let args: Vec<String> = env::args().skip(1).collect();
    let verify = args.iter().any(|a| a == "--verify");
    let policy = if verify {
        ChecksumPolicy::Verify
    } else {
        ChecksumPolicy::Ignore
    };

    let store = Arc::new(VariableStore::with_defaults());
    let parser = FrameParser::new(store.clone(), FrameDecoder::new(policy));
    parser.set_protocol(protocol);

    let seeded = store.batch_set([("voltage", 231.5), ("current", 12.5)]);
    for (key, err) in &seeded.failures {
        eprintln!("Could not set {key}: {err}");
    }

    let frames: Vec<&str> = if args.iter().any(|a| a != "--verify") {
        args.iter()
            .map(String::as_str)
            .filter(|a| *a != "--verify")
            .collect()
    } else {
        SAMPLE_FRAMES.to_vec()
    };

    for text in frames {
        println!("> {text}");
        match hex::decode(text.replace(' ', "")) {
            Ok(frame) => println!("{}\n", parser.parse_to_report(&frame)),
            Err(err) => println!("Not a hex frame: {err}\n"),
        }
    }

    match parser.encode_register_value(RegisterAddress(0x1001), 2500.0) {
        Ok(raw) => println!("Writing 2500 mA to 0x1001 stores {raw} A"),
        Err(err) => println!("Could not encode value: {err}"),
    }
}
