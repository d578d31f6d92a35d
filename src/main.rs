fn main() -> anyhow::Result<()> {
    gesture_capture_lib::run()
}
