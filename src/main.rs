fn main() {
    if let Err(err) = trade_prep::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
