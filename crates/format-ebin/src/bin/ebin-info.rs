//! Print an EBIN container's header and relocation table.

use std::process;

use format_ebin::EbinFile;

fn main() {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: ebin-info <file.ebin>");
        process::exit(2);
    };

    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{path}: {e}");
            process::exit(1);
        }
    };
    let ebin = match EbinFile::parse(&bytes) {
        Ok(ebin) => ebin,
        Err(e) => {
            eprintln!("{path}: {e}");
            process::exit(1);
        }
    };

    let h = &ebin.header;
    println!("{path}");
    println!(
        "  {:?} module, container v{}, interface {}.{}",
        h.component,
        h.version,
        h.interface_major(),
        h.interface_minor()
    );
    println!(
        "  code {:#x} @ {:#x}, data {:#x} @ {:#x}, bss {:#x}",
        h.code_size, h.code_offset, h.data_size, h.data_offset, h.bss_size
    );
    println!("  entry +{:#x}, min ram {:#x}", h.entry_offset, h.min_ram);
    println!("  {} relocation(s)", ebin.relocs().len());
    for (i, r) in ebin.relocs().iter().enumerate() {
        println!("    {i}: {:?} {:?} +{:#x}", r.kind, r.section, r.offset);
    }
}
