//! `siusb bit-info`: show the header of a `.bit` file.

use siusb_bitstream::{parse_bit_file, BitInfo};

use crate::{BitInfoArgs, GlobalArgs, ReportFormat};

fn render_text(info: &BitInfo) -> String {
    format!(
        "design:  {}\npart:    {}\ndate:    {} {}\npayload: {} bytes\n",
        info.file_name, info.part_name, info.date, info.time, info.payload_len
    )
}

/// Runs `siusb bit-info`.
pub fn run(args: &BitInfoArgs, _global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let info = parse_bit_file(&args.file)?.info();
    match args.format {
        ReportFormat::Text => print!("{}", render_text(&info)),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
    }
    Ok(0)
}
