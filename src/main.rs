fn main() {
    githaul::cli::run();
}
