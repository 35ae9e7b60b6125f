fn main() {
    xordiff::cli::run_sparsify();
}
