use anyhow::Context;

fn main() -> anyhow::Result<()> {
    vidcsv_desk_lib::run().context("vidcsv-desk failed")
}
