fn main() {
    std::process::exit(matchcaller_lib::run())
}
