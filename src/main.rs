fn main() {
    screenchat_lib::run()
}
