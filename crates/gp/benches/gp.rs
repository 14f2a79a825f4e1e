use criterion::{Criterion, criterion_group, criterion_main};
use linfa::prelude::{Dataset, Fit};
use ndarray::{Array1, Array2, Axis, array};
use ndarray_npy::{read_npy, write_npy};
use ndarray_rand::RandomExt;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use rand_xoshiro::Xoshiro256Plus;
use skipgp_gp::kernels::RbfKernel;
use skipgp_gp::skip::SkipKernel;
use skipgp_gp::{Kriging, SkipKriging};

fn training_data(nt: usize, dim: usize) -> (Array2<f64>, Array1<f64>) {
    let prefix = "skip";
    let xfilename = format!("{prefix}_xt_{nt}x{dim}.npy");
    let xt: Array2<f64> = match read_npy(&xfilename) {
        Ok(xt) => xt,
        Err(_) => {
            let mut rng = Xoshiro256Plus::seed_from_u64(42);
            let xt = Array2::random_using((nt, dim), Uniform::new(-1., 1.), &mut rng);
            write_npy(&xfilename, &xt).expect("cannot save xt");
            xt
        }
    };
    let yt = xt.map_axis(Axis(1), |x| x.mapv(|v| (3. * v).sin()).sum());
    (xt, yt)
}

fn criterion_gp(c: &mut Criterion) {
    let dims = [2, 6];
    let nts = [200, 1000];

    let mut group = c.benchmark_group("gp");
    group.sample_size(10);
    for i in 0..dims.len() {
        let (xt, yt) = training_data(nts[i], dims[i]);
        let dataset = Dataset::new(xt, yt);

        if nts[i] <= 200 {
            group.bench_function(format!("exact gp {}x{}", nts[i], dims[i]), |b| {
                b.iter(|| {
                    std::hint::black_box(
                        Kriging::params()
                            .n_iter(5)
                            .fit(&dataset)
                            .expect("GP fit error"),
                    )
                })
            });
        }

        group.bench_function(format!("skip gp {}x{}", nts[i], dims[i]), |b| {
            b.iter(|| {
                std::hint::black_box(
                    SkipKriging::params()
                        .n_iter(5)
                        .fit(&dataset)
                        .expect("SKIP GP fit error"),
                )
            })
        });
    }
    group.finish();
}

fn criterion_root_decomposition(c: &mut Criterion) {
    let (xt, _) = training_data(2000, 8);
    let kernel = SkipKernel::new(RbfKernel::new(array![0.5]).expect("lengthscale"))
        .fit_grids(&xt)
        .expect("grids");

    let mut group = c.benchmark_group("skip");
    group.sample_size(10);
    for rank in [10, 30, 60] {
        group.bench_function(format!("root decomposition rank {rank}"), |b| {
            b.iter(|| std::hint::black_box(kernel.root_decomposition(&xt, rank, 0)))
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_gp, criterion_root_decomposition);
criterion_main!(benches);
