use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("mcsaab {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: mcsaab");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("MCSAAB_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("features: async={}, cli=true", cfg!(feature = "async"));
    println!("packet_types: {}", packet_type_list());

    Ok(SUCCESS)
}

fn packet_type_list() -> String {
    mcsaab_frame::PacketType::ALL
        .iter()
        .map(|ty| format!("{}={:#04x}", ty.name().to_lowercase(), ty.as_u8()))
        .collect::<Vec<_>>()
        .join(", ")
}
