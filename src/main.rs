fn main() -> anyhow::Result<()> {
    slotwatch_lib::run()
}
