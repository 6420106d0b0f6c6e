fn main() {
    if let Err(err) = relsplit::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
