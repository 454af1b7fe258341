fn main() {
    if let Err(err) = pop_impute::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
