mod runner;
mod simulation;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    runner::main(std::env::args().collect())
}
