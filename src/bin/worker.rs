fn main() {
    calcbox::cli::run()
}
