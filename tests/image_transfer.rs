//! End-to-end exercise of the image-transfer engine over an in-memory
//! duplex pipe: no real modem, serial port, or socket involved. Mirrors
//! what a hardware-in-the-loop test would check, but runs anywhere.

use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ahoi::config::{ImageParameters, TransmissionParameters};
use ahoi::imgtx::{Capture, ImageTxEngine, NullSink, ProgressSink};
use ahoi::{Error, Modem, Result, Transport};

use image::{DynamicImage, RgbImage};

/// Generates a small solid-color test image instead of reading one from
/// disk, standing in for the camera.
struct SyntheticCapture;

impl Capture for SyntheticCapture {
    fn capture(&self, size: (u32, u32), _flash: bool) -> Result<DynamicImage> {
        let img = RgbImage::from_fn(size.0, size.1, |x, y| {
            image::Rgb([(x * 16) as u8, (y * 16) as u8, 128])
        });
        Ok(DynamicImage::ImageRgb8(img))
    }
}

struct NeverCapture;

impl Capture for NeverCapture {
    fn capture(&self, _size: (u32, u32), _flash: bool) -> Result<DynamicImage> {
        Err(Error::Image("viewer side never captures".into()))
    }
}

/// Reports transfer completion (and the final image, if any) over a
/// channel so the test can block on it with a timeout.
struct ChannelSink {
    done: std::sync::mpsc::Sender<bool>,
    last_image: Mutex<Option<DynamicImage>>,
}

impl ProgressSink for ChannelSink {
    fn update_image(&self, image: &DynamicImage) {
        *self.last_image.lock().unwrap() = Some(image.clone());
    }

    fn finished(&self, success: bool) {
        let _ = self.done.send(success);
    }
}

fn test_params() -> (TransmissionParameters, ImageParameters) {
    let trans = TransmissionParameters {
        cam_modem_id: 255,
        hard_ack: false,
        payload_length: 20,
        ack_timeout_ms: 200,
        num_retransmissions: 5,
        logging: false,
    };
    let image = ImageParameters {
        width: 16,
        height: 16,
        quality: 60,
        progressive: false,
        use_flash: false,
        use_camera: true,
    };
    (trans, image)
}

#[test]
fn image_request_delivers_full_image_over_loopback_pipe() {
    let (cam_io, viewer_io) = tokio::io::duplex(4096);

    let cam_transport = Transport::from_io(cam_io, None).expect("camera transport");
    let viewer_transport = Transport::from_io(viewer_io, None).expect("viewer transport");

    let cam_modem = Arc::new(Modem::from_transport(cam_transport));
    let viewer_modem = Arc::new(Modem::from_transport(viewer_transport));

    cam_modem.receive(true).unwrap();
    viewer_modem.receive(true).unwrap();

    let (trans, image) = test_params();

    let (done_tx, done_rx) = channel();
    let sink = Arc::new(ChannelSink {
        done: done_tx,
        last_image: Mutex::new(None),
    });

    let _cam_engine = ImageTxEngine::new(
        Arc::clone(&cam_modem),
        trans,
        image,
        Arc::new(NullSink),
        Arc::new(SyntheticCapture),
    );
    let viewer_engine = ImageTxEngine::new(
        Arc::clone(&viewer_modem),
        trans,
        image,
        sink,
        Arc::new(NeverCapture),
    );

    viewer_engine.request_img(Some((image.width, image.height)), Some(image.quality), Some(false));

    match done_rx.recv_timeout(Duration::from_secs(10)) {
        Ok(success) => assert!(success, "image transfer reported failure"),
        Err(RecvTimeoutError::Timeout) => panic!("image transfer did not complete in time"),
        Err(RecvTimeoutError::Disconnected) => panic!("sink channel dropped unexpectedly"),
    }

    viewer_engine.close();
    _cam_engine.close();
}
