use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("courier {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: courier");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("wire_protocol: {}", courier_frame::PROTOCOL_VERSION);
    println!(
        "target: {}",
        option_env!("COURIER_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("COURIER_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: peer={}, wal={}, gzip={}, async={}, cli=true",
        cfg!(feature = "peer"),
        cfg!(feature = "wal"),
        cfg!(feature = "gzip"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
