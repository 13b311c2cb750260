#![forbid(unsafe_code)]

fn main() {
    std::process::exit(threadline_cli::run());
}
