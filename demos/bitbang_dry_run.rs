use sbc_hal::{
    sim::SimChip, BitBang, BitBangConfig, BitBangPins, GpioLevel, PinScheme, Protocol,
    RaspberryPiPinout, Result,
};

// Usual SPI0 display wiring, BCM numbers
const SCLK_BCM: u32 = 11;
const MOSI_BCM: u32 = 10;
const CE0_BCM: u32 = 8;
const DC_BCM: u32 = 24;
const RST_BCM: u32 = 25;

fn main() -> Result<()> {
    env_logger::init();
    let chip = SimChip::raspberry_pi();
    let mut gpio = chip.handle_with(PinScheme::Bcm, RaspberryPiPinout);

    let dc = gpio.pin(DC_BCM)?;
    let pins = BitBangPins::new(gpio.pin(SCLK_BCM)?, gpio.pin(MOSI_BCM)?)
        .with_chip_select(gpio.pin(CE0_BCM)?)
        .with_data_command(dc)
        .with_reset(gpio.pin(RST_BCM)?);
    println!("Wiring (logical pins): {:?}", pins);

    let config = BitBangConfig::display_reset();
    let mut display = BitBang::with_delay(gpio, chip.delay(), pins, config)?;
    println!("Device reset done at t = {:?}", chip.now());

    chip.clear_writes();
    // SSD1306-style init: display off, clock divide, display on
    display.send_command(&[0xAE, 0xD5, 0x80, 0xAF])?;
    let frame: Vec<u8> = (0..1024u32).map(|i| (i % 256) as u8).collect();
    display.send_data(&frame)?;

    let dc_levels: Vec<&str> = chip
        .writes_to(dc)
        .iter()
        .map(|w| if w.level == GpioLevel::High { "data" } else { "command" })
        .collect();
    println!("DC phases: {:?}", dc_levels);

    for (i, burst) in chip.decode_bursts(pins.sclk, pins.sda, pins.ce).iter().enumerate() {
        let preview: Vec<String> = burst.iter().take(8).map(|b| format!("{:02X}", b)).collect();
        println!(
            "Burst {}: {} bytes [{}{}]",
            i,
            burst.len(),
            preview.join(" "),
            if burst.len() > 8 { " ..." } else { "" }
        );
    }
    println!("{} pin writes recorded", chip.writes().len());

    display.cleanup();
    println!("Pins released.");
    Ok(())
}
