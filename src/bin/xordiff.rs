fn main() {
    xordiff::cli::run_xordiff();
}
