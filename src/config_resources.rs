// Provide a mapping for the bootloader GPIO pins

//
//| GPIO # | Name     | Description                                   |
//| ------ | -------- | --------------------------------------------- |
//| 16     | SD_MISO  | SPI0 RX, data from the card (DO).             |
//| 17     | SD_CS    | Card chip select. Active low.                 |
//| 18     | SD_CLK   | SPI0 SCK.                                     |
//| 19     | SD_MOSI  | SPI0 TX, data to the card (DI).               |

use assign_resources::assign_resources;
use embassy_rp::Peri;
use embassy_rp::peripherals;

assign_resources! {
  /// SD card slot on SPI0
  sd_card: SdCardResources {
    spi: SPI0,
    clk: PIN_18,
    mosi: PIN_19,
    miso: PIN_16,
    cs: PIN_17,
  },
  /// Internal QSPI flash holding the bootloader and the application
  flash: FlashResources {
    flash: FLASH,
    dma: DMA_CH0,
  },
}
